use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::packet::Packet;

/// Seam between the listener's connection-handling loop and the node's
/// packet-processing logic, so the listener can be driven in tests without
/// a fully wired `Node`. Mirrors the trait-at-the-seam style the teacher
/// crate uses for its runtime/transport boundary.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch_packet(&self, packet: Packet, source_ip: Ipv4Addr);

    /// Handles a raw byte stream read off a connection classified as
    /// `FrameKind::RawStream`, optionally preceded by a `DirectTransferMarkerPacket`
    /// giving `file_id`/`filename` hints.
    async fn dispatch_raw_stream(&self, marker: Option<Packet>, source_ip: Ipv4Addr, body: Vec<u8>) -> Option<PathBuf>;
}
