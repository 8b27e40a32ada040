use crate::solver::action::ActionKind;
use crate::solver::action::SolverAction;
use std::time::Instant;

/// scheduling bands; computed from the continuous score, compared as
/// bands so the queue stays stable under small confidence jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<f32> for Priority {
    fn from(score: f32) -> Self {
        match score {
            s if s >= 1.1 => Self::Critical,
            s if s >= 0.8 => Self::High,
            s if s >= 0.5 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// lifecycle of a queued action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Queued,
    Scheduled,
    Executing,
    Completed,
    Failed,
}

/// a solver action wrapped with everything the queue needs to schedule
/// it: identity, band, spatial cluster, dependencies, retry budget
#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub action: SolverAction,
    pub id: u64,
    pub status: Status,
    pub created_at: Instant,
    pub scheduled_at: Option<Instant>,
    pub priority: Priority,
    pub score: f32,
    pub cluster: Option<usize>,
    pub retries: usize,
    pub depends_on: Vec<u64>,
}

impl QueuedAction {
    /// kind factor weights certainty by consequence: a wrong flag is
    /// recoverable, a wrong reveal is not
    pub fn score_of(action: &SolverAction) -> f32 {
        let factor = match action.kind {
            ActionKind::Flag => 1.2,
            ActionKind::Reveal => 1.0,
            ActionKind::Guess => 0.7,
        };
        action.confidence * factor
    }

    pub fn new(id: u64, action: SolverAction) -> Self {
        let score = Self::score_of(&action);
        Self {
            action,
            id,
            status: Status::Queued,
            created_at: Instant::now(),
            scheduled_at: None,
            priority: Priority::from(score),
            score,
            cluster: None,
            retries: 0,
            depends_on: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certain_flags_outrank_certain_reveals() {
        let flag = QueuedAction::new(0, SolverAction::flag((0, 0), "t"));
        let reveal = QueuedAction::new(1, SolverAction::reveal((0, 0), "t"));
        assert!(flag.score > reveal.score);
        assert!(flag.priority == Priority::Critical);
        assert!(reveal.priority == Priority::High);
    }

    #[test]
    fn low_confidence_guesses_rank_low() {
        let guess = QueuedAction::new(
            0,
            SolverAction::guess((0, 0), 0.3, crate::solver::action::EngineKind::MonteCarlo),
        );
        assert!(guess.priority == Priority::Low);
    }
}
