//! Sync Engine: debounced outbound pushes and full bidirectional sync.

pub mod connectivity;
pub mod engine;
pub mod merge;
pub mod pusher;

pub use connectivity::Connectivity;
pub use engine::{StageReport, SyncEngine, SyncReport};
pub use pusher::Pusher;
