//! # iqrf-dpa
//!
//! IQRF DPA protocol engine:
//! - Table-driven DPA packet codec for the standard peripherals
//! - Protocol state machine pacing one request at a time over the RF link
//! - Protocol layer correlating responses with requests
//! - Per-network timing parameters learned from responses
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Callers (typed calls)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ CallRequest          ▲ Message
//! ┌─────────────────────▼──────────────────────┴────────────────┐
//! │                     Protocol Layer                           │
//! │        (Request Registry, Timing Params, Listener)           │
//! └──────────┬───────────────────────────────────┬──────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!   ┌─────────────────┐                 ┌─────────────────┐
//!   │  Message Codec  │                 │  State Machine  │
//!   │ (Mapping Table) │                 │ (Worker Thread) │
//!   └────────┬────────┘                 └─────────────────┘
//!            │ frames
//!            ▼
//!   ┌─────────────────┐
//!   │    Transport    │
//!   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod timing;
pub mod machine;
pub mod registry;
pub mod layer;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DpaError, Result};
pub use config::Config;
pub use layer::{MessageListener, ProtocolLayer};
pub use machine::{ProtocolStateMachine, State};
pub use protocol::MessageCodec;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of iqrf-dpa
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
