use std::time::Duration;

pub const PORT: u16 = 5000;
pub const BUFFER_SIZE: usize = 4096;
pub const CHUNK_SIZE: usize = 8192;
pub const MAX_TTL: u8 = 3;

pub const ROUTING_TIMEOUT: Duration = Duration::from_secs(60);
pub const SECONDARY_ROUTE_GRACE: Duration = Duration::from_millis((ROUTING_TIMEOUT.as_millis() as u64 * 3) / 2);
pub const SECONDARY_ROUTE_MAX_AGE_FACTOR: u32 = 3;

pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(10);
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);
pub const GATEWAY_BROADCAST_INTERVAL: Duration = Duration::from_secs(20);

pub const MESSAGE_CACHE_SIZE: usize = 100;
pub const MESSAGE_CACHE_MAX_AGE: Duration = Duration::from_secs(3600);
pub const FILE_CACHE_SIZE: usize = 5;
pub const FILE_CACHE_MAX_AGE: Duration = Duration::from_secs(3 * 3600);
pub const CACHE_GC_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub const SEEN_MESSAGE_IDS_LIMIT: usize = 1000;
pub const SEEN_MESSAGE_IDS_EVICT_FRACTION: f64 = 0.2;

pub const SCAN_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
pub const SCAN_MAX_IN_FLIGHT: usize = 20;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const FRAME_RECV_TIMEOUT: Duration = Duration::from_secs(15);
pub const RAW_STREAM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DIRECT_STREAM_SETTLE: Duration = Duration::from_millis(250);

pub const UNICAST_RETRY: u32 = 2;
pub const BROADCAST_RETRY: u32 = 1;
pub const FILE_INFO_RETRY: u32 = 3;
pub const FILE_CHUNK_RETRY: u32 = 5;
pub const FORWARD_MESSAGE_RETRY: u32 = 2;
pub const FORWARD_FILE_RETRY: u32 = 3;

pub const CHUNK_PACING_LONG_TRANSFER: Duration = Duration::from_millis(100);
pub const CHUNK_PACING_SHORT_TRANSFER: Duration = Duration::from_millis(50);
pub const LONG_TRANSFER_CHUNK_THRESHOLD: u32 = 50;

/// AES-128 key used when no override is present in `mesh_config.json`. Static
/// and shared, matching `offline_mesh_app/config.py::AES_KEY` — see
/// DESIGN.md for the obfuscation-vs-trust decision this open question resolves to.
pub const DEFAULT_CIPHER_KEY: [u8; 16] = *b"ThisIsA16ByteKey";

pub const FALLBACK_SUBNETS: &[(u8, u8, u8, u8)] = &[
    (192, 168, 0, 0),
    (192, 168, 1, 0),
    (10, 0, 0, 0),
    (172, 16, 0, 0),
    (169, 254, 0, 0),
];

pub const CONFIG_FILE_NAME: &str = "mesh_config.json";
pub const DOWNLOAD_DIR_NAME: &str = "MeshDownloads";
pub const TEMP_DIR_NAME: &str = "temp";

/// Wire framing kind byte: see SPEC_FULL.md §4.1 for why this replaces the
/// 5s/10KiB raw-stream heuristic from the distilled spec.
pub const FRAME_KIND_PACKET: u8 = 0x01;
pub const FRAME_KIND_RAW_STREAM: u8 = 0x02;
