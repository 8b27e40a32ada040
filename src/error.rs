/// error taxonomy for the pipeline, in increasing severity.
///
/// soft failures never surface here; components log them and return
/// empty results. everything below is either caller error, a deadline,
/// a driver fault, or an invariant violation that should end the session.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("shape mismatch: region is {expected:?} but array is {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("coordinates ({0}, {1}) outside known bounds")]
    InvalidCoordinates(crate::Coordinate, crate::Coordinate),
    #[error("deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),
    #[error("browser driver failure: {0}")]
    Driver(String),
    #[error("invariant violation: {0}")]
    Fatal(String),
}

impl SweepError {
    /// hard errors abort the session; everything else is recoverable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invariant_violations_are_fatal() {
        assert!(SweepError::Fatal("divergent arrays".into()).is_fatal());
        assert!(!SweepError::InvalidCoordinates(3, 4).is_fatal());
        assert!(!SweepError::Timeout(std::time::Duration::from_secs(1)).is_fatal());
    }
}
