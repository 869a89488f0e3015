//! Mail model and the delivery seam.

pub mod address;
pub mod email;
pub mod outbox;

pub use address::EmailAddress;
pub use email::Email;
pub use outbox::{Kind, LogOutbox, Outbox, Outgoing, RecordingOutbox};
