use std::net::Ipv4Addr;
use std::time::Duration;

use crate::cache::PendingFile;
use crate::packet::NodeId;

pub use crate::router::RouteView;

/// UI-facing view of an in-progress file transfer, built from `PendingFile`
/// with a derived completion ratio so callers don't divide by zero
/// themselves.
#[derive(Debug, Clone)]
pub struct ProgressView {
    pub file_id: String,
    pub filename: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub missing_chunks: Vec<u32>,
    pub progress: f64,
}

impl ProgressView {
    pub fn from_pending(file_id: String, pending: PendingFile) -> Self {
        let progress = if pending.total_chunks == 0 {
            0.0
        } else {
            f64::from(pending.received_chunks) / f64::from(pending.total_chunks)
        };
        ProgressView {
            file_id,
            filename: pending.filename,
            received_chunks: pending.received_chunks,
            total_chunks: pending.total_chunks,
            missing_chunks: pending.missing_chunks,
            progress,
        }
    }
}

/// UI-facing view of a delivered or relayed application message, surfaced
/// through `NodeApi::message_history`.
#[derive(Debug, Clone)]
pub struct LoggedMessage {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub content: String,
    pub message_type: String,
    pub received_at: Duration,
}
