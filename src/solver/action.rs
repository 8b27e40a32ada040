use crate::Confidence;
use crate::Point;

/// what to do to a cell
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ActionKind {
    Reveal,
    Flag,
    Guess,
}

/// which engine produced a conclusion
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum EngineKind {
    Csp,
    MonteCarlo,
    NeuralAssist,
}

/// one conclusion from the solver, ready for the action queue.
/// deterministic conclusions carry confidence 1.0; guesses carry the
/// engine's documented low confidence.
#[derive(Debug, Clone)]
pub struct SolverAction {
    pub kind: ActionKind,
    pub at: Point,
    pub confidence: Confidence,
    pub engine: EngineKind,
    pub reasoning: String,
}

impl SolverAction {
    pub fn reveal(at: Point, reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Reveal,
            at,
            confidence: 1.0,
            engine: EngineKind::Csp,
            reasoning: reasoning.into(),
        }
    }
    pub fn flag(at: Point, reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Flag,
            at,
            confidence: 1.0,
            engine: EngineKind::Csp,
            reasoning: reasoning.into(),
        }
    }
    pub fn guess(at: Point, confidence: Confidence, engine: EngineKind) -> Self {
        Self {
            kind: ActionKind::Guess,
            at,
            confidence,
            engine,
            reasoning: String::from("probabilistic pick"),
        }
    }
}

impl std::fmt::Display for SolverAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let kind = match self.kind {
            ActionKind::Reveal => "reveal",
            ActionKind::Flag => "flag",
            ActionKind::Guess => "guess",
        };
        write!(f, "{} ({}, {}) @{:.2}", kind, self.at.0, self.at.1, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_actions_are_certain() {
        assert!(SolverAction::reveal((0, 0), "safe").confidence == 1.0);
        assert!(SolverAction::flag((0, 0), "mine").confidence == 1.0);
        assert!(SolverAction::guess((0, 0), 0.3, EngineKind::MonteCarlo).confidence == 0.3);
    }
}
