//! Error types for the DPA protocol engine
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::machine::State;

/// Result type alias using DpaError
pub type Result<T> = std::result::Result<T, DpaError>;

/// Unified error type for DPA protocol operations
#[derive(Debug, Error)]
pub enum DpaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    /// Request could not be serialized; nothing was transmitted.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Inbound frame could not be resolved to interface, method or result.
    #[error("Decoding error: {0}")]
    Decoding(String),

    // -------------------------------------------------------------------------
    // State Machine Errors
    // -------------------------------------------------------------------------
    #[error("Unexpected event {event} in state {state:?}")]
    UnexpectedEvent { event: &'static str, state: State },

    /// The awaited event arrived after its waiting state timed out.
    #[error("Waiting state already timed out into {0:?}")]
    StateTimedOut(State),

    /// The worker thread did not acknowledge an event in time.
    #[error("State change not acknowledged: {0}")]
    ConsistencyTimeout(String),

    // -------------------------------------------------------------------------
    // Argument / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Transport / Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not running")]
    NotRunning,
}
