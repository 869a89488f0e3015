//! Generic workflow engine: one single-writer actor per workflow instance.

pub mod actor;
mod dispatch;
pub mod policy;
pub mod recovery;
mod roster;
pub mod snapshot;
pub mod workflow;

pub use actor::{Collaborators, Engine, EngineHandle};
pub use policy::{FailurePolicy, Trigger};
pub use recovery::{Loaded, load};
pub use snapshot::{Ledger, Snapshot};
pub use workflow::{Addresses, Deadline, Effect, Intake, Interpreter, Turn, Unclassified, Workflow};
