//! `mde-client` — transport layer for the Defender for Endpoint machine
//! action API.
//!
//! # Architecture
//!
//! ```text
//! Session          ← client-credentials bearer token, refreshed on expiry
//!     │
//!     ▼
//! DefenderClient   ← one HTTP exchange per call, JSON in / JSON out
//!     │              `error.message` bodies → RemoteApiError::Vendor
//!     ▼
//! MachineActionApi ← the seam the orchestration engine is written against
//! AlertApi         ← alert comment updates after a verdict
//! ```
//!
//! Nothing in this crate retries or sleeps. Sequencing, polling and
//! timeouts live in `mde-response`.

pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use client::{AlertApi, AlertQuery, DefenderClient, MachineActionApi};
pub use error::RemoteApiError;
pub use session::{Credentials, Session};
pub use types::{
    ActionKind, ActionRecord, ActionRequest, Alert, AlertEvidence, CommandRecord, ODataList,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RemoteApiError>;
