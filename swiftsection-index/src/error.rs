//! The one error type allowed to escape [`crate::indexer::InterfaceIndexer::prepare`].
//!
//! Every other failure mode (extraction, per-record, resolution) is folded
//! into the event bus and a `tracing::warn!` call instead of a `Result::Err`
//! -- see the module docs on `indexer` for the policy this implements.

use thiserror::Error;

use crate::events::Phase;

/// A fatal error raised from one of the Interface Indexer's phases.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("phase {phase:?} panicked while indexing: {message}")]
    PhaseFailed { phase: Phase, message: String },
}
