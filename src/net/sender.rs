use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::sleep;

use crate::cache::MessageCache;
use crate::codec::FrameCodec;
use crate::constants::{
    BROADCAST_RETRY, CONNECT_TIMEOUT, DIRECT_STREAM_SETTLE, FILE_CHUNK_RETRY, FILE_INFO_RETRY, FORWARD_FILE_RETRY,
    FORWARD_MESSAGE_RETRY, PORT, UNICAST_RETRY,
};
use crate::net::framing::{write_frame, write_raw_stream, FrameKind};
use crate::packet::Packet;
use crate::router::{NextHop, Router};

/// Sends an already-encoded frame to a single peer, retrying with linear
/// backoff. Grounded on `offline_mesh_app/client/sender.py::send_to_peer`.
pub async fn send_to_peer(ip: Ipv4Addr, frame_body: &[u8], retries: u32) -> bool {
    for attempt in 0..=retries {
        match try_send_once(ip, frame_body).await {
            Ok(()) => return true,
            Err(e) => {
                if attempt < retries {
                    let backoff = std::time::Duration::from_millis(((attempt + 1) as u64) * 1500);
                    log::warn!("send to {ip} failed (attempt {}/{retries}), retrying in {backoff:?}: {e}", attempt + 1);
                    sleep(backoff).await;
                } else {
                    log::error!("send to {ip} failed after {retries} retries: {e}");
                }
            }
        }
    }
    false
}

/// Sends an already-encoded `file_chunk` frame to a single peer, retrying
/// with exponential backoff (`(attempt+1)*0.5s`) up to `FILE_CHUNK_RETRY`
/// times. Spec.md §4.7 calls this out as its own envelope-level policy,
/// distinct from `send_to_peer`'s linear backoff used elsewhere.
async fn send_chunk_to_peer(ip: Ipv4Addr, frame_body: &[u8]) -> bool {
    for attempt in 0..=FILE_CHUNK_RETRY {
        match try_send_once(ip, frame_body).await {
            Ok(()) => return true,
            Err(e) => {
                if attempt < FILE_CHUNK_RETRY {
                    let backoff = std::time::Duration::from_millis(((attempt + 1) as u64) * 500);
                    log::warn!(
                        "chunk send to {ip} failed (attempt {}/{FILE_CHUNK_RETRY}), retrying in {backoff:?}: {e}",
                        attempt + 1
                    );
                    sleep(backoff).await;
                } else {
                    log::error!("chunk send to {ip} failed after {FILE_CHUNK_RETRY} retries: {e}");
                }
            }
        }
    }
    false
}

async fn try_send_once(ip: Ipv4Addr, frame_body: &[u8]) -> std::io::Result<()> {
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((ip, PORT)))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    write_frame(&mut stream, FrameKind::Packet, frame_body)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Sends the direct-transfer marker, pauses briefly so the receiver has a
/// chance to note it before the raw-stream connection lands, then opens a
/// fresh connection and streams the whole file as one raw-stream frame.
/// Grounded on SPEC_FULL.md §4.7 step 2 / `handler.py`'s marker-preceded
/// receive path; the original has no sender-side counterpart to port from,
/// since the Python `send_file` never attempts this path.
async fn send_direct_stream(ip: Ipv4Addr, marker: &Packet, codec: &FrameCodec, body: &[u8]) -> bool {
    let frame = match codec.encode(marker) {
        Ok(f) => f,
        Err(e) => {
            log::error!("failed to encode direct transfer marker: {e}");
            return false;
        }
    };
    if !send_to_peer(ip, &frame, 0).await {
        return false;
    }
    sleep(DIRECT_STREAM_SETTLE).await;

    match try_direct_stream_once(ip, body).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("direct stream to {ip} failed: {e}");
            false
        }
    }
}

async fn try_direct_stream_once(ip: Ipv4Addr, body: &[u8]) -> std::io::Result<()> {
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((ip, PORT)))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    write_raw_stream(&mut stream, body)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Resolves a `NextHop` into a concrete send plan and executes it, trying
/// bridge-carrying neighbors before plain ones when flooding.
async fn send_via_next_hop(router: &Router, next_hop: NextHop, frame_body: &[u8], retries: u32, exclude: Option<Ipv4Addr>) -> bool {
    match next_hop {
        NextHop::None => false,
        NextHop::Direct(ip) => {
            if Some(ip) != exclude {
                return send_to_peer(ip, frame_body, retries).await;
            }
            // The only route back goes the way the packet came from; try a
            // bridge route with a different next hop before giving up.
            let routes = router.get_all_routes();
            let alternative = routes.values().find(|r| r.via_bridge && Some(r.next_hop) != exclude).map(|r| r.next_hop);
            match alternative {
                Some(alt_ip) => send_to_peer(alt_ip, frame_body, retries).await,
                None => false,
            }
        }
        NextHop::Flood(neighbors) => {
            let routes = router.get_all_routes();
            let mut bridge_ips = Vec::new();
            let mut plain_ips = Vec::new();
            for ip in neighbors {
                if Some(ip) == exclude {
                    continue;
                }
                if routes.values().any(|r| r.next_hop == ip && r.via_bridge) {
                    bridge_ips.push(ip);
                } else {
                    plain_ips.push(ip);
                }
            }

            let mut success = false;
            for ip in &bridge_ips {
                if send_to_peer(*ip, frame_body, retries).await {
                    success = true;
                }
            }
            if !success {
                for ip in &plain_ips {
                    if send_to_peer(*ip, frame_body, retries).await {
                        success = true;
                    }
                }
            }
            success
        }
    }
}

/// Owns the outbound send path: unicast/broadcast/file/forward, each
/// grounded on `offline_mesh_app/client/sender.py`.
pub struct Sender {
    router: Arc<Router>,
    codec: Arc<FrameCodec>,
    message_cache: Arc<MessageCache>,
}

impl Sender {
    pub fn new(router: Arc<Router>, codec: Arc<FrameCodec>, message_cache: Arc<MessageCache>) -> Self {
        Sender { router, codec, message_cache }
    }

    pub async fn send_unicast(&self, packet: &Packet) -> bool {
        let dest = match packet.destination() {
            Some(d) => d.clone(),
            None => return false,
        };
        let next_hop = self.router.get_next_hop(&dest);
        let frame = match self.codec.encode(packet) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to encode unicast packet: {e}");
                return false;
            }
        };
        send_via_next_hop(&self.router, next_hop, &frame, UNICAST_RETRY, None).await
    }

    pub async fn send_broadcast(&self, packet: &Packet) -> bool {
        let frame = match self.codec.encode(packet) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to encode broadcast packet: {e}");
                return false;
            }
        };
        let neighbors = self.router.neighbors();
        let mut success = false;
        for ip in neighbors {
            if send_to_peer(ip, &frame, BROADCAST_RETRY).await {
                success = true;
            }
        }
        success
    }

    /// Sends a file to `info`'s destination. If the destination is a direct
    /// neighbor, first attempts a direct-stream transfer (one marker packet,
    /// a brief settle, then the raw bytes over a fresh connection); on any
    /// failure, or when the destination isn't a direct neighbor, falls back
    /// to sending `file_info` followed by chunk packets in order, pacing
    /// between chunks as SPEC_FULL.md §6 describes.
    pub async fn send_file(&self, info: &Packet, chunks: &[Packet], marker: &Packet, raw_bytes: &[u8]) -> bool {
        let dest = match info.destination() {
            Some(d) => d.clone(),
            None => return false,
        };

        if let Some(ip) = self.router.direct_neighbor_route(&dest) {
            if send_direct_stream(ip, marker, &self.codec, raw_bytes).await {
                log::info!("direct-stream transfer to {dest} succeeded");
                return true;
            }
            log::info!("direct-stream transfer to {dest} failed, falling back to chunked transfer");
        }

        let next_hop = self.router.get_next_hop(&dest);
        let ip = match self.pick_file_next_hop(next_hop) {
            Some(ip) => ip,
            None => {
                log::error!("no route to {dest} for file transfer");
                return false;
            }
        };

        let info_frame = match self.codec.encode(info) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to encode file_info: {e}");
                return false;
            }
        };
        if !send_to_peer(ip, &info_frame, FILE_INFO_RETRY).await {
            log::error!("failed to send file_info to {dest}");
            return false;
        }

        let pacing = if chunks.len() as u32 > crate::constants::LONG_TRANSFER_CHUNK_THRESHOLD {
            crate::constants::CHUNK_PACING_LONG_TRANSFER
        } else {
            crate::constants::CHUNK_PACING_SHORT_TRANSFER
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let frame = match self.codec.encode(chunk) {
                Ok(f) => f,
                Err(e) => {
                    log::error!("failed to encode chunk {index}: {e}");
                    return false;
                }
            };
            if !send_chunk_to_peer(ip, &frame).await {
                log::error!("failed to send chunk {index} to {dest}");
                return false;
            }
            sleep(pacing).await;
        }
        true
    }

    fn pick_file_next_hop(&self, next_hop: NextHop) -> Option<Ipv4Addr> {
        match next_hop {
            NextHop::None => None,
            NextHop::Direct(ip) => Some(ip),
            NextHop::Flood(neighbors) => {
                let routes = self.router.get_all_routes();
                neighbors
                    .iter()
                    .find(|ip| routes.values().any(|r| r.next_hop == **ip && r.via_bridge))
                    .or_else(|| neighbors.first())
                    .copied()
            }
        }
    }

    /// Forwards a received packet on, decrementing TTL and recording our own
    /// node in the hop list. Mirrors `sender.py::forward_packet`.
    pub async fn forward_packet(&self, mut packet: Packet, received_from: Ipv4Addr, my_id: &crate::packet::NodeId) -> bool {
        let ttl = packet.ttl().saturating_sub(1);
        if ttl == 0 || packet.src() == my_id {
            return false;
        }
        packet.set_ttl(ttl);
        if packet.multi_hop() {
            packet.push_hop(my_id.clone());
        }

        match &packet {
            Packet::Message(m) => {
                if m.dst == *my_id {
                    return false;
                }
                if !self.router.should_forward_message(&m.id, ttl) {
                    return false;
                }
                self.forward_to_destination(&packet, &m.dst, received_from, FORWARD_MESSAGE_RETRY).await
            }
            Packet::Broadcast(b) => {
                if !self.message_cache.has_message(&b.id) && !self.router.should_forward_message(&b.id, ttl) {
                    return false;
                }
                let frame = match self.codec.encode(&packet) {
                    Ok(f) => f,
                    Err(_) => return false,
                };
                let mut success = false;
                for ip in self.router.neighbors() {
                    if ip == received_from {
                        continue;
                    }
                    if send_to_peer(ip, &frame, 0).await {
                        success = true;
                    }
                }
                success
            }
            Packet::FileInfo(f) => {
                if f.dst == *my_id {
                    return false;
                }
                self.forward_to_destination(&packet, &f.dst, received_from, FORWARD_FILE_RETRY).await
            }
            Packet::FileChunk(c) => {
                if c.dst == *my_id {
                    return false;
                }
                self.forward_to_destination(&packet, &c.dst, received_from, FORWARD_FILE_RETRY).await
            }
            _ => false,
        }
    }

    /// Forwards an already TTL-decremented packet toward `dest`, never back
    /// to `received_from`. File frames (`FileInfo`/`FileChunk`) are forwarded
    /// with `FORWARD_FILE_RETRY`, a higher retry count than plain messages'
    /// `FORWARD_MESSAGE_RETRY`, per spec.md §4.7's "use higher retry count"
    /// for file frames.
    async fn forward_to_destination(
        &self,
        packet: &Packet,
        dest: &crate::packet::NodeId,
        received_from: Ipv4Addr,
        retries: u32,
    ) -> bool {
        let next_hop = self.router.get_next_hop(dest);
        let frame = match self.codec.encode(packet) {
            Ok(f) => f,
            Err(_) => return false,
        };
        send_via_next_hop(&self.router, next_hop, &frame, retries, Some(received_from)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::message_packet;

    fn sender_with_neighbor(my_id: &str, neighbor: Ipv4Addr) -> Sender {
        let router = Arc::new(Router::new(my_id.into(), false));
        router.add_neighbor(neighbor);
        let codec = Arc::new(FrameCodec::new(*b"ThisIsA16ByteKey"));
        let message_cache = Arc::new(MessageCache::new(10));
        Sender::new(router, codec, message_cache)
    }

    #[tokio::test]
    async fn forward_packet_refuses_once_ttl_hits_zero() {
        let sender = sender_with_neighbor("relay___", Ipv4Addr::new(10, 0, 0, 9));
        let mut packet = message_packet("src_____".into(), Ipv4Addr::new(10, 0, 0, 1), "dst_____".into(), "hi".into(), "chat".into());
        packet.set_ttl(1);

        let forwarded = sender.forward_packet(packet, Ipv4Addr::new(10, 0, 0, 1), &"relay___".into()).await;
        assert!(!forwarded);
    }

    #[tokio::test]
    async fn forward_packet_refuses_its_own_src() {
        let sender = sender_with_neighbor("me______", Ipv4Addr::new(10, 0, 0, 9));
        let packet = message_packet("me______".into(), Ipv4Addr::new(10, 0, 0, 1), "dst_____".into(), "hi".into(), "chat".into());

        let forwarded = sender.forward_packet(packet, Ipv4Addr::new(10, 0, 0, 1), &"me______".into()).await;
        assert!(!forwarded);
    }

    #[tokio::test]
    async fn forward_packet_stops_when_addressed_to_self() {
        let sender = sender_with_neighbor("dst_____", Ipv4Addr::new(10, 0, 0, 9));
        let packet = message_packet("src_____".into(), Ipv4Addr::new(10, 0, 0, 1), "dst_____".into(), "hi".into(), "chat".into());

        let forwarded = sender.forward_packet(packet, Ipv4Addr::new(10, 0, 0, 1), &"dst_____".into()).await;
        assert!(!forwarded);
    }

    #[tokio::test]
    async fn send_file_with_no_route_fails_without_panicking() {
        let router = Arc::new(Router::new("me______".into(), false));
        let codec = Arc::new(FrameCodec::new(*b"ThisIsA16ByteKey"));
        let message_cache = Arc::new(MessageCache::new(10));
        let sender = Sender::new(router, codec, message_cache);
        let info = crate::packet::file_info_packet(
            "me______".into(),
            Ipv4Addr::new(10, 0, 0, 1),
            "unreachable".into(),
            "f1".into(),
            "f.bin".into(),
            10,
            1,
        );
        let marker = crate::packet::direct_transfer_marker("me______".into(), Ipv4Addr::new(10, 0, 0, 1), "f1".into(), "f.bin".into());
        let sent = sender.send_file(&info, &[], &marker, b"0123456789").await;
        assert!(!sent);
    }
}
