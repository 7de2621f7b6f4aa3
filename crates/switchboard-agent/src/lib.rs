//! # Switchboard Agent
//!
//! The conversation side of Switchboard: the generation interface seam, the
//! session history store, and the orchestrator that interleaves generation
//! with tool execution under a bounded recursion depth.

pub mod generation;
pub mod history;
pub mod orchestrator;

pub use generation::{AssistantPart, GenerationContext, GenerationProvider, PartStream};
pub use history::{HistoryStore, InMemoryHistory};
pub use orchestrator::Orchestrator;
