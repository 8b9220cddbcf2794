//! Error types for the worker.

use roomrelay_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Binding the listener failed. Fatal at startup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The core loop has exited; commands can no longer be delivered.
    #[error("worker is stopped")]
    Stopped,
}
