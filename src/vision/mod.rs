pub mod edges;
pub mod matcher;
pub mod patch;
pub mod pixel;
pub mod segmenter;
pub mod signature;
pub mod template;
