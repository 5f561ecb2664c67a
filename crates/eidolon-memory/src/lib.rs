//! Eidolon Memory - the persistent substrate
//!
//! One SQLite database holds the identity row, episodic memories, semantic
//! concepts, growth milestones, and system logs. Working memory is volatile
//! and lives only in process.

pub mod commit;
pub mod embedding;
pub mod episodic;
pub mod identity;
pub mod semantic;
pub mod store;
pub mod working;

pub use commit::{commit_turn, CommitOutcome, TurnCommit};
pub use embedding::Embedding;
pub use episodic::{EpisodicEvent, EpisodicMemory, EpisodicStore, RecalledMemory};
pub use identity::{Identity, IdentityStore, TraitRecord};
pub use semantic::{QueriedConcept, SemanticItem, SemanticKind, SemanticStore, Teaching};
pub use store::Store;
pub use working::{WorkingItem, WorkingMemory};
