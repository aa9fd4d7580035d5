//! 服务模块

pub mod chat;
pub mod distiller;
pub mod extraction;
pub mod generation;
pub mod organizer;
pub mod parser;
pub mod prompts;

pub use chat::{ChatReply, ChatService};
pub use distiller::Distiller;
pub use extraction::ExtractionPipeline;
pub use generation::{GenerationEvent, GenerationPipeline};
pub use organizer::{HierarchyOrganizer, OrganizeOutcome};
