//! Everything the bonsai assistant's agents can call.
//!
//! Read tools answer directly. Proposal tools never write: they validate the
//! request, queue a deferred command for the owner's approval and return its
//! id. Every proposal tool is wrapped by the tool-call governor, which bounds
//! identical calls within one conversation turn.

mod confirmation;
mod context;
mod error;
mod fertilizers;
mod governor;
mod proposal;
pub mod records;
mod registry;
mod species;
mod specimens;
mod traits;
mod treatments;

pub use confirmation::{ConfirmationQueue, DeferredCommand, PendingConfirmation};
pub use context::{ConfirmationId, OwnerId, ToolContext, TurnScope};
pub use error::{Result, ToolError};
pub use fertilizers::{FERTILIZER_STOREKEEPER, FertilizerOp, FertilizerTool};
pub use governor::{DEFAULT_IDENTICAL_CALL_LIMIT, FnTool, GovernedTool, call_key, govern, govern_with_limit};
pub use registry::{ToolRegistry, build_toolset};
pub use species::{BOTANIST, SpeciesOp, SpeciesTool};
pub use specimens::{GARDENER, SpecimenOp, SpecimenTool};
pub use traits::{Tool, ToolEffect, ToolSpec, to_llm_tool_def, tool_error};
pub use treatments::{TREATMENT_STOREKEEPER, TreatmentOp, TreatmentTool};
