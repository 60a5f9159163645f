//! Tiered memory for financial-modeling conversations.
//!
//! - [`ConversationMemory`]: the live, budgeted event log of one session
//! - [`condenser`]: strategies that shrink a log back under budget
//! - [`LongTermMemory`]: embedded knowledge shared across sessions
//! - [`PreferenceStore`]: per-user settings that steer condensation
//! - [`MemoryManager`]: ties the tiers together per session

mod budget;
pub mod condenser;
mod context;
mod conversation;
mod domain;
mod event;
mod long_term;
mod manager;
mod preferences;
mod vector_index;

pub use budget::Budget;
pub use condenser::{
    Aggressiveness, Condensation, CondensationPhase, Condenser, CondenserRegistry,
    CondenserSettings, CondenserState, CondenserStrategy, RecentEventsCondenser,
};
pub use context::ContextBundle;
pub use conversation::{AppendOutcome, CondensationReport, ConversationMemory};
pub use domain::{Domain, DomainSchema, FieldSpec};
pub use event::{Event, EventId, EventKind, EventPayload, PreservedField};
pub use long_term::{EntryId, EntryMetadata, LongTermMemory, MemoryEntry};
pub use manager::{MemoryManager, SessionInfo, SessionKey};
pub use preferences::{
    AGGRESSIVENESS_KEY, CONDENSER_KEY, DEFAULT_DOMAIN_KEY, InMemoryPreferenceStore,
    PreferenceStore, RedbPreferenceStore, UserPreferences,
};
pub use vector_index::{InMemoryVectorIndex, IndexHit, IndexRecord, VectorIndex};
