//! Live interruption handling: the wire protocol and the orchestrator that
//! drives a question through retrieval, answering, visuals, and synthesis.

mod orchestrator;
pub mod protocol;

pub use orchestrator::Orchestrator;
