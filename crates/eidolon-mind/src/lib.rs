//! Eidolon Mind - the cognitive pipeline.
//!
//! Modules propose thoughts into a global workspace; one wins competition,
//! is broadcast back, and becomes the seed of the reply. The consciousness
//! loop orchestrates the ten phases of a turn and owns learning and
//! persistence at the end of each.

pub mod attention;
pub mod consciousness;
pub mod emotion;
pub mod policy;
pub mod prediction;
pub mod response;
pub mod subscribers;
pub mod turn;
pub mod values;
pub mod workspace;

pub use consciousness::{Consciousness, Reply};
pub use emotion::{AppraisalEvent, EmotionEngine, EmotionSnapshot, EmotionState};
pub use policy::PolicyGuard;
pub use workspace::{GlobalWorkspace, Subscriber, WorkspaceInput};
