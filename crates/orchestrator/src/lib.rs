//! Turn-level orchestration for gatherline.
//!
//! - [`Orchestrator`]: runs the sources for one turn in priority order under
//!   an outer deadline and returns a [`TurnOutcome`]
//! - [`ToolManager`]: the per-turn registry of used sources
//! - [`policy`]: URL detection and the skip rules
//! - [`ResponseValidator`]: attribution check on the final answer
//! - [`TitleCoordinator`]: lock- and rate-limit-guarded title generation

pub mod orchestrator;
pub mod policy;
pub mod title;
pub mod tool_manager;
pub mod validator;

pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, SkippedSource, TurnOutcome, TurnReport, TurnRequest,
};
pub use policy::{ResearchDecision, RetrievalPolicy, detect_urls};
pub use title::{TitleCoordinator, TitleGenerator, TitleOutcome};
pub use tool_manager::ToolManager;
pub use validator::{ResponseValidator, friendly_name};
