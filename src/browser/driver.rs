use crate::error::SweepError;
use crate::vision::pixel::Pixmap;
use crate::Coordinate;

/// pixel-space viewport geometry as reported by the browser
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// the capability set the core contracts against for everything that
/// touches the actual game. every call may block and may fail; the
/// core treats failures as retryable unless coordinates are invalid.
pub trait BrowserDriver: Send + Sync {
    fn click_cell(&self, x: Coordinate, y: Coordinate) -> Result<bool, SweepError>;
    fn flag_cell(&self, x: Coordinate, y: Coordinate) -> Result<bool, SweepError>;
    fn double_click_cell(&self, x: Coordinate, y: Coordinate) -> Result<bool, SweepError>;
    fn scroll_to(&self, dx: Coordinate, dy: Coordinate) -> Result<bool, SweepError>;
    fn current_viewport(&self) -> Result<Viewport, SweepError>;
    fn take_screenshot(&self) -> Result<Pixmap, SweepError>;
}

/// inert driver for tests and dry runs: every interaction succeeds and
/// the screen is forever blank
#[derive(Debug, Default)]
pub struct NullDriver;

impl BrowserDriver for NullDriver {
    fn click_cell(&self, _: Coordinate, _: Coordinate) -> Result<bool, SweepError> {
        Ok(true)
    }
    fn flag_cell(&self, _: Coordinate, _: Coordinate) -> Result<bool, SweepError> {
        Ok(true)
    }
    fn double_click_cell(&self, _: Coordinate, _: Coordinate) -> Result<bool, SweepError> {
        Ok(true)
    }
    fn scroll_to(&self, _: Coordinate, _: Coordinate) -> Result<bool, SweepError> {
        Ok(true)
    }
    fn current_viewport(&self) -> Result<Viewport, SweepError> {
        Ok(Viewport {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        })
    }
    fn take_screenshot(&self) -> Result<Pixmap, SweepError> {
        Ok(Pixmap::new(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_driver_always_agrees() {
        let driver = NullDriver;
        assert!(driver.click_cell(0, 0).unwrap());
        assert!(driver.flag_cell(-5, 9).unwrap());
        assert!(driver.take_screenshot().unwrap().is_empty());
    }
}
