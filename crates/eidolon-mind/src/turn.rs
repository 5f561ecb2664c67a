//! The per-turn state object.
//!
//! The ten phases are explicit enumerated states; each handler takes the
//! turn, does its work, and advances it. Suspension points stay auditable
//! and skipping a phase is a programming error the object itself catches.

use chrono::{DateTime, Utc};
use eidolon_core::{Error, Result, Thought};
use eidolon_memory::Embedding;

/// The ten phases of one pass through the loop, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TurnPhase {
    Sensory,
    Attention,
    WorkingAdmit,
    Prediction,
    Proposals,
    Competition,
    Selection,
    Broadcast,
    Response,
    Learning,
    Complete,
}

impl TurnPhase {
    fn next(self) -> Option<Self> {
        use TurnPhase::*;
        match self {
            Sensory => Some(Attention),
            Attention => Some(WorkingAdmit),
            WorkingAdmit => Some(Prediction),
            Prediction => Some(Proposals),
            Proposals => Some(Competition),
            Competition => Some(Selection),
            Selection => Some(Broadcast),
            Broadcast => Some(Response),
            Response => Some(Learning),
            Learning => Some(Complete),
            Complete => None,
        }
    }
}

/// Accumulating state for one input event.
#[derive(Debug)]
pub struct Turn {
    pub text: String,
    pub from_creator: bool,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
    pub transcript_confidence: Option<f32>,
    pub embedding: Option<Embedding>,
    pub salience: f32,
    pub novelty: f32,
    pub prediction_error: f32,
    pub proposals: Vec<Thought>,
    pub winner: Option<Thought>,
    phase: TurnPhase,
}

impl Turn {
    pub fn new(text: String, from_creator: bool, timestamp: DateTime<Utc>, seq: u64) -> Self {
        Self {
            text,
            from_creator,
            timestamp,
            seq,
            transcript_confidence: None,
            embedding: None,
            salience: 0.0,
            novelty: 0.0,
            prediction_error: 0.0,
            proposals: Vec::new(),
            winner: None,
            phase: TurnPhase::Sensory,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Advance to the next phase. Advancing out of order is a loop bug.
    pub fn advance(&mut self, to: TurnPhase) -> Result<()> {
        match self.phase.next() {
            Some(next) if next == to => {
                self.phase = to;
                Ok(())
            }
            _ => Err(Error::Internal(format!(
                "turn tried to advance {:?} -> {:?}",
                self.phase, to
            ))),
        }
    }

    /// Skip straight to learning (the short-circuit paths still persist).
    pub fn short_circuit_to_learning(&mut self) {
        self.phase = TurnPhase::Learning;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_strictly_in_order() {
        let mut turn = Turn::new("hi".into(), true, Utc::now(), 0);
        assert_eq!(turn.phase(), TurnPhase::Sensory);
        turn.advance(TurnPhase::Attention).unwrap();
        turn.advance(TurnPhase::WorkingAdmit).unwrap();
        // Skipping Prediction is rejected.
        assert!(turn.advance(TurnPhase::Proposals).is_err());
        turn.advance(TurnPhase::Prediction).unwrap();
    }

    #[test]
    fn complete_is_terminal() {
        let mut turn = Turn::new("hi".into(), false, Utc::now(), 1);
        turn.short_circuit_to_learning();
        turn.advance(TurnPhase::Complete).unwrap();
        assert!(turn.advance(TurnPhase::Sensory).is_err());
    }
}
