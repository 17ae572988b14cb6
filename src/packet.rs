use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 8 lowercase hex character node identifier, generated once and persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(hex::encode(bytes))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub dst: NodeId,
    pub content: String,
    pub message_type: String,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastPacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub content: String,
    pub message_type: String,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStateEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbors: Option<Vec<Ipv4Addr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gateway: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
    pub link_state: BTreeMap<NodeId, LinkStateEntry>,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfoPacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub dst: NodeId,
    pub filename: String,
    pub filesize: u64,
    pub total_chunks: u32,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunkPacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub dst: NodeId,
    pub file_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// base64-encoded chunk bytes, per the wire schema in SPEC_FULL.md §6.
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayUpdatePacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub is_gateway: bool,
    pub peers: Vec<Ipv4Addr>,
    pub ttl: u8,
    pub timestamp: f64,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default)]
    pub multi_hop: bool,
}

/// Marker packet sent ahead of a raw byte stream on a fresh connection for
/// direct (single-hop) file transfers. Grounded on
/// `offline_mesh_app/server/handler.py::handle_file_transfer`'s
/// `direct_file_transfer` marker; supplemented into the spec per SPEC_FULL.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectTransferMarkerPacket {
    pub id: String,
    pub src: NodeId,
    pub src_ip: Ipv4Addr,
    pub file_id: String,
    pub filename: String,
    pub ttl: u8,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    #[serde(rename = "message")]
    Message(MessagePacket),
    #[serde(rename = "broadcast")]
    Broadcast(BroadcastPacket),
    #[serde(rename = "routing")]
    Routing(RoutingPacket),
    #[serde(rename = "file_info")]
    FileInfo(FileInfoPacket),
    #[serde(rename = "file_chunk")]
    FileChunk(FileChunkPacket),
    #[serde(rename = "gateway_update")]
    GatewayUpdate(GatewayUpdatePacket),
    #[serde(rename = "direct_transfer_marker")]
    DirectTransferMarker(DirectTransferMarkerPacket),
}

impl Packet {
    pub fn id(&self) -> &str {
        match self {
            Packet::Message(p) => &p.id,
            Packet::Broadcast(p) => &p.id,
            Packet::Routing(p) => &p.id,
            Packet::FileInfo(p) => &p.id,
            Packet::FileChunk(p) => &p.id,
            Packet::GatewayUpdate(p) => &p.id,
            Packet::DirectTransferMarker(p) => &p.id,
        }
    }

    pub fn src(&self) -> &NodeId {
        match self {
            Packet::Message(p) => &p.src,
            Packet::Broadcast(p) => &p.src,
            Packet::Routing(p) => &p.src,
            Packet::FileInfo(p) => &p.src,
            Packet::FileChunk(p) => &p.src,
            Packet::GatewayUpdate(p) => &p.src,
            Packet::DirectTransferMarker(p) => &p.src,
        }
    }

    pub fn ttl(&self) -> u8 {
        match self {
            Packet::Message(p) => p.ttl,
            Packet::Broadcast(p) => p.ttl,
            Packet::Routing(p) => p.ttl,
            Packet::FileInfo(p) => p.ttl,
            Packet::FileChunk(p) => p.ttl,
            Packet::GatewayUpdate(p) => p.ttl,
            Packet::DirectTransferMarker(p) => p.ttl,
        }
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        match self {
            Packet::Message(p) => p.ttl = ttl,
            Packet::Broadcast(p) => p.ttl = ttl,
            Packet::Routing(p) => p.ttl = ttl,
            Packet::FileInfo(p) => p.ttl = ttl,
            Packet::FileChunk(p) => p.ttl = ttl,
            Packet::GatewayUpdate(p) => p.ttl = ttl,
            Packet::DirectTransferMarker(p) => p.ttl = ttl,
        }
    }

    pub fn multi_hop(&self) -> bool {
        match self {
            Packet::Message(p) => p.multi_hop,
            Packet::Broadcast(p) => p.multi_hop,
            Packet::Routing(p) => p.multi_hop,
            Packet::FileInfo(p) => p.multi_hop,
            Packet::FileChunk(p) => p.multi_hop,
            Packet::GatewayUpdate(p) => p.multi_hop,
            Packet::DirectTransferMarker(_) => false,
        }
    }

    pub fn push_hop(&mut self, id: NodeId) {
        let hops = match self {
            Packet::Message(p) => &mut p.hops,
            Packet::Broadcast(p) => &mut p.hops,
            Packet::Routing(p) => &mut p.hops,
            Packet::FileInfo(p) => &mut p.hops,
            Packet::FileChunk(p) => &mut p.hops,
            Packet::GatewayUpdate(p) => &mut p.hops,
            Packet::DirectTransferMarker(_) => return,
        };
        if !hops.contains(&id) {
            hops.push(id);
        }
    }

    pub fn destination(&self) -> Option<&NodeId> {
        match self {
            Packet::Message(p) => Some(&p.dst),
            Packet::FileInfo(p) => Some(&p.dst),
            Packet::FileChunk(p) => Some(&p.dst),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Packet::Message(_) => "message",
            Packet::Broadcast(_) => "broadcast",
            Packet::Routing(_) => "routing",
            Packet::FileInfo(_) => "file_info",
            Packet::FileChunk(_) => "file_chunk",
            Packet::GatewayUpdate(_) => "gateway_update",
            Packet::DirectTransferMarker(_) => "direct_transfer_marker",
        }
    }
}

pub fn message_packet(
    src: NodeId,
    src_ip: Ipv4Addr,
    dst: NodeId,
    content: String,
    message_type: String,
) -> Packet {
    Packet::Message(MessagePacket {
        id: new_message_id(),
        src,
        src_ip,
        dst,
        content,
        message_type,
        ttl: crate::constants::MAX_TTL,
        timestamp: unix_now(),
        hops: Vec::new(),
        multi_hop: true,
    })
}

pub fn broadcast_packet(src: NodeId, src_ip: Ipv4Addr, content: String, message_type: String) -> Packet {
    Packet::Broadcast(BroadcastPacket {
        id: new_message_id(),
        src,
        src_ip,
        content,
        message_type,
        ttl: crate::constants::MAX_TTL,
        timestamp: unix_now(),
        hops: Vec::new(),
        multi_hop: true,
    })
}

pub fn file_info_packet(
    src: NodeId,
    src_ip: Ipv4Addr,
    dst: NodeId,
    file_id: String,
    filename: String,
    filesize: u64,
    total_chunks: u32,
) -> Packet {
    Packet::FileInfo(FileInfoPacket {
        id: file_id,
        src,
        src_ip,
        dst,
        filename,
        filesize,
        total_chunks,
        ttl: crate::constants::MAX_TTL,
        timestamp: unix_now(),
        hops: Vec::new(),
        multi_hop: true,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn file_chunk_packet(
    src: NodeId,
    src_ip: Ipv4Addr,
    dst: NodeId,
    file_id: String,
    chunk_index: u32,
    total_chunks: u32,
    data: String,
    filename: Option<String>,
) -> Packet {
    Packet::FileChunk(FileChunkPacket {
        id: new_message_id(),
        src,
        src_ip,
        dst,
        file_id,
        chunk_index,
        total_chunks,
        data,
        filename,
        ttl: crate::constants::MAX_TTL,
        timestamp: unix_now(),
        hops: Vec::new(),
        multi_hop: true,
    })
}

pub fn gateway_update_packet(src: NodeId, src_ip: Ipv4Addr, is_gateway: bool, peers: Vec<Ipv4Addr>) -> Packet {
    Packet::GatewayUpdate(GatewayUpdatePacket {
        id: new_message_id(),
        src,
        src_ip,
        is_gateway,
        peers,
        ttl: 2,
        timestamp: unix_now(),
        hops: Vec::new(),
        multi_hop: false,
    })
}

pub fn direct_transfer_marker(src: NodeId, src_ip: Ipv4Addr, file_id: String, filename: String) -> Packet {
    Packet::DirectTransferMarker(DirectTransferMarkerPacket {
        id: new_message_id(),
        src,
        src_ip,
        file_id,
        filename,
        ttl: 1,
        timestamp: unix_now(),
    })
}
