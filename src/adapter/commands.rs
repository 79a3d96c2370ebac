//! Command protocol between the adapter handle and its task
//!
//! The handle and the broker never touch the process directly; they send
//! one of these over the session's channel and the task applies it in order
//! with the stdout records it is reading.

use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::types::identifiers::RequestId;
use crate::types::permissions::PermissionDecision;

/// Commands accepted by a session's adapter task
#[derive(Debug)]
pub enum AdapterCommand {
    /// Write a new turn to the agent
    Send {
        /// User text
        text: String,
        /// File paths listed after the text
        attachments: Vec<PathBuf>,
        /// Completed once the write was accepted (or failed)
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Forward a user decision the broker already recorded
    ApplyDecision {
        /// Request being answered
        request_id: RequestId,
        /// Recorded decision
        decision: PermissionDecision,
    },
}
