//! Client for the remote shadow copy of the library.

pub mod client;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{RemoteClient, RemoteProgress, RemoteSetting};
pub use transport::{HttpTransport, PipelineTransport};
pub use wire::{ResultSet, Row, SqlValue, Statement};
