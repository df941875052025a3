//! Event entry points that talk to pages via postMessage rather than HTTP responses.

pub mod push;
pub mod sync;

pub use push::{ClickOutcome, NotificationCenter, NotificationDescriptor};
pub use sync::{SyncManager, SYNC_TAG};
