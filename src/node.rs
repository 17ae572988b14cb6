use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use crate::api::{LoggedMessage, ProgressView};
use crate::cache::{FileCache, MessageCache};
use crate::codec::FrameCodec;
use crate::config::NodeConfig;
use crate::constants::{CHUNK_SIZE, MAX_TTL};
use crate::net::advertiser::{run_cache_gc, run_gateway_sharing, run_link_state_broadcast};
use crate::net::dispatcher::Dispatcher;
use crate::net::listener::Listener;
use crate::net::scanner::{candidate_hosts, discover_peers};
use crate::net::sender::Sender;
use crate::packet::{
    broadcast_packet, direct_transfer_marker, file_chunk_packet, file_info_packet, message_packet, new_message_id,
    NodeId, Packet,
};
use crate::router::{RouteView, Router};

/// Ties together the router, caches, codec, and network tasks into a single
/// runnable mesh node. Corresponds to the module-level globals wired
/// together ad hoc across `offline_mesh_app/main.py` and friends; here
/// they're owned fields behind `Arc`s shared with spawned tasks.
pub struct Node {
    my_id: NodeId,
    my_ip: Ipv4Addr,
    is_hotspot_host: bool,
    router: Arc<Router>,
    message_cache: Arc<MessageCache>,
    file_cache: Arc<FileCache>,
    codec: Arc<FrameCodec>,
    sender: Sender,
    history: Mutex<Vec<LoggedMessage>>,
    /// File-id/filename hints from a `direct_transfer_marker`, keyed by the
    /// sender's IP, consumed by the raw-stream connection that follows it.
    pending_direct: Mutex<HashMap<Ipv4Addr, PendingDirect>>,
}

struct PendingDirect {
    filename: String,
    received_at: Instant,
}

impl Node {
    pub fn new(config: &NodeConfig, my_ip: Ipv4Addr, download_dir: PathBuf) -> Self {
        let router = Arc::new(Router::new(config.my_id.clone(), config.is_hotspot_host));
        let message_cache = Arc::new(MessageCache::new(crate::constants::MESSAGE_CACHE_SIZE));
        let file_cache = Arc::new(FileCache::new(crate::constants::FILE_CACHE_SIZE, download_dir));
        let codec = Arc::new(FrameCodec::new(config.cipher_key()));
        let sender = Sender::new(Arc::clone(&router), Arc::clone(&codec), Arc::clone(&message_cache));

        for ip in &config.known_peers {
            router.add_neighbor(*ip);
        }

        Node {
            my_id: config.my_id.clone(),
            my_ip,
            is_hotspot_host: config.is_hotspot_host,
            router,
            message_cache,
            file_cache,
            codec,
            sender,
            history: Mutex::new(Vec::new()),
            pending_direct: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns the listener, periodic broadcast/discovery/cache-GC loops,
    /// and (if this node is a hotspot host) the gateway peer-sharing loop.
    /// Runs until the process is killed; mirrors the set of daemon threads
    /// `offline_mesh_app/main.py` starts.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        self.run_on(("0.0.0.0", crate::constants::PORT)).await
    }

    /// Like [`Node::run`] but binding the listener to an explicit address,
    /// so a test process can run several nodes on distinct loopback
    /// addresses instead of all contending for `0.0.0.0:PORT`.
    pub async fn run_on(self: Arc<Self>, bind_addr: impl tokio::net::ToSocketAddrs + Send + 'static) -> std::io::Result<()> {
        let listener = Arc::new(Listener::new(Arc::clone(&self) as Arc<dyn Dispatcher>, Arc::clone(&self.codec)));
        let listener_task = tokio::spawn(listener.run_on(bind_addr));

        tokio::spawn(run_link_state_broadcast(
            Arc::clone(&self.router),
            Arc::clone(&self.codec),
            self.my_id.clone(),
            self.my_ip,
        ));

        if self.is_hotspot_host {
            tokio::spawn(run_gateway_sharing(
                Arc::clone(&self.router),
                Arc::clone(&self.codec),
                self.my_id.clone(),
                self.my_ip,
            ));
        }

        tokio::spawn(run_cache_gc(Arc::clone(&self.message_cache), Arc::clone(&self.file_cache)));

        let router = Arc::clone(&self.router);
        let my_ip = self.my_ip;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(crate::constants::DISCOVERY_INTERVAL);
            loop {
                ticker.tick().await;
                let found = discover_peers(candidate_hosts(), Some(my_ip)).await;
                for ip in found {
                    router.add_neighbor(ip);
                }
            }
        });

        listener_task.await?
    }

    /// Sends a unicast message and logs it to `message_history`, matching
    /// `sender.py:88`'s `log_message(MY_ID, destination_id, ...)` call
    /// alongside the send, regardless of delivery outcome.
    pub async fn send_unicast(&self, destination: NodeId, content: String, message_type: String) -> bool {
        let packet = message_packet(self.my_id.clone(), self.my_ip, destination, content, message_type);
        self.record_history(&packet);
        self.sender.send_unicast(&packet).await
    }

    /// Sends a broadcast message and logs it to `message_history`, matching
    /// `sender.py:169`'s `log_message(MY_ID, "ALL", ...)` call alongside
    /// the send, regardless of delivery outcome.
    pub async fn send_broadcast(&self, content: String, message_type: String) -> bool {
        let packet = broadcast_packet(self.my_id.clone(), self.my_ip, content, message_type);
        self.record_history(&packet);
        self.sender.send_broadcast(&packet).await
    }

    /// Chunks a file and sends `file_info` followed by each `file_chunk`.
    /// Grounded on `offline_mesh_app/client/sender.py::send_file`.
    pub async fn send_file(&self, destination: NodeId, path: &Path) -> Result<bool, crate::error::MeshError> {
        let bytes = std::fs::read(path)?;
        let filesize = bytes.len() as u64;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let total_chunks = bytes.len().div_ceil(CHUNK_SIZE).max(1) as u32;
        let file_id = new_message_id();

        let info = file_info_packet(
            self.my_id.clone(),
            self.my_ip,
            destination.clone(),
            file_id.clone(),
            filename.clone(),
            filesize,
            total_chunks,
        );

        let mut chunks = Vec::with_capacity(total_chunks as usize);
        for (index, chunk_bytes) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, chunk_bytes);
            chunks.push(file_chunk_packet(
                self.my_id.clone(),
                self.my_ip,
                destination.clone(),
                file_id.clone(),
                index as u32,
                total_chunks,
                encoded,
                Some(filename.clone()),
            ));
        }

        let marker = direct_transfer_marker(self.my_id.clone(), self.my_ip, file_id.clone(), filename.clone());
        Ok(self.sender.send_file(&info, &chunks, &marker, &bytes).await)
    }

    pub fn active_routes(&self) -> std::collections::BTreeMap<NodeId, RouteView> {
        self.router.get_all_routes()
    }

    pub fn pending_files(&self) -> HashMap<String, ProgressView> {
        self.file_cache
            .get_pending_files()
            .into_iter()
            .map(|(id, pending)| {
                let view = ProgressView::from_pending(id.clone(), pending);
                (id, view)
            })
            .collect()
    }

    pub fn neighbors(&self) -> Vec<Ipv4Addr> {
        self.router.neighbors()
    }

    pub fn message_history(&self) -> Vec<LoggedMessage> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    pub async fn request_discovery(&self) {
        let found = discover_peers(candidate_hosts(), Some(self.my_ip)).await;
        for ip in found {
            self.router.add_neighbor(ip);
        }
    }

    pub async fn request_routing_broadcast(&self) {
        let (link_state, seq) = self.router.get_link_state(self.my_ip);
        let packet = Packet::Routing(crate::packet::RoutingPacket {
            id: new_message_id(),
            src: self.my_id.clone(),
            src_ip: self.my_ip,
            ttl: MAX_TTL,
            timestamp: unix_now(),
            hops: Vec::new(),
            multi_hop: true,
            link_state,
            seq,
        });
        if let Ok(frame) = self.codec.encode(&packet) {
            for ip in self.router.neighbors() {
                crate::net::sender::send_to_peer(ip, &frame, 1).await;
            }
        }
    }

    pub fn add_peer_manual(&self, ip: Ipv4Addr) {
        self.router.add_neighbor(ip);
    }

    pub fn set_gateway_mode(&self, _enabled: bool) {
        // Gateway mode is fixed at construction from `NodeConfig` in this
        // design: toggling it live would require restarting the gateway
        // sharing task, which `Node::run` only spawns once at startup.
        log::warn!("gateway mode can only be set via config before Node::run; ignoring runtime toggle");
    }

    pub fn my_id(&self) -> &NodeId {
        &self.my_id
    }
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[async_trait]
impl Dispatcher for Node {
    async fn dispatch_packet(&self, packet: Packet, source_ip: Ipv4Addr) {
        self.router.add_neighbor(source_ip);

        match &packet {
            Packet::Routing(r) => {
                // Multi-hop propagation happens through each node's own
                // periodic re-advertisement (`get_link_state` folds in
                // routes learned from this update), not by relaying the
                // received packet itself — `forward_packet` has no arm
                // for `Routing` (see spec.md §4.7's dispatch list).
                self.router.update_link_state(&r.src, source_ip, &r.link_state, r.seq, r.ttl);
            }
            Packet::Message(m) => {
                if self.message_cache.has_message(&m.id) {
                    return;
                }
                self.message_cache.add_message(&m.id, packet.clone());
                if m.dst == self.my_id {
                    self.record_history(&packet);
                }
                self.sender.forward_packet(packet, source_ip, &self.my_id).await;
            }
            Packet::Broadcast(b) => {
                if self.message_cache.has_message(&b.id) {
                    return;
                }
                self.message_cache.add_message(&b.id, packet.clone());
                self.record_history(&packet);
                self.sender.forward_packet(packet, source_ip, &self.my_id).await;
            }
            Packet::FileInfo(f) => {
                if f.dst != self.my_id {
                    self.sender.forward_packet(packet, source_ip, &self.my_id).await;
                } else {
                    log::info!("receiving file {} from {}", f.filename, f.src);
                }
            }
            Packet::FileChunk(c) => {
                if c.dst != self.my_id {
                    self.sender.forward_packet(packet, source_ip, &self.my_id).await;
                    return;
                }
                let binary = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &c.data)
                    .unwrap_or_else(|_| c.data.clone().into_bytes());
                let filename = c.filename.clone().unwrap_or_else(|| format!("received_{}.bin", c.file_id));
                match self.file_cache.add_file_chunk(&c.file_id, c.chunk_index, binary, c.total_chunks, &filename) {
                    Ok(true) => match self.file_cache.save_complete_file(&c.file_id) {
                        Ok(path) => log::info!("file saved to {}", path.display()),
                        Err(e) => log::error!("failed to save completed file {}: {e}", c.file_id),
                    },
                    Ok(false) => {}
                    Err(e) => log::warn!("rejected chunk for {}: {e}", c.file_id),
                }
            }
            Packet::GatewayUpdate(g) => {
                self.router.update_link_state(
                    &g.src,
                    source_ip,
                    &[(g.src.clone(), crate::packet::LinkStateEntry { is_gateway: Some(g.is_gateway), ..Default::default() })]
                        .into_iter()
                        .collect(),
                    0,
                    2,
                );
                self.router.set_gateway_peers(&g.src, &g.peers);
            }
            Packet::DirectTransferMarker(m) => {
                self.pending_direct.lock().expect("pending direct lock poisoned").insert(
                    source_ip,
                    PendingDirect {
                        filename: m.filename.clone(),
                        received_at: Instant::now(),
                    },
                );
            }
        }
    }

    async fn dispatch_raw_stream(&self, _marker: Option<Packet>, source_ip: Ipv4Addr, body: Vec<u8>) -> Option<PathBuf> {
        let download_dir = self.file_cache_download_dir();
        let temp_dir = download_dir.join(crate::constants::TEMP_DIR_NAME);
        std::fs::create_dir_all(&temp_dir).ok()?;

        let pending = {
            let mut pending = self.pending_direct.lock().expect("pending direct lock poisoned");
            pending.remove(&source_ip).filter(|p| p.received_at.elapsed() <= crate::constants::RAW_STREAM_TIMEOUT)
        };
        let final_name = match &pending {
            Some(p) => crate::cache::stamped_filename(&p.filename),
            None => format!("received_file_{}_{}.dat", source_ip, unix_now() as u64),
        };
        let final_path = download_dir.join(&final_name);
        let temp_path = temp_dir.join(&final_name);

        if let Err(e) = std::fs::write(&temp_path, &body) {
            log::error!("failed to write raw stream from {source_ip} to temp file: {e}");
            let _ = std::fs::remove_file(&temp_path);
            return None;
        }
        if let Err(e) = std::fs::rename(&temp_path, &final_path) {
            log::error!("failed to finalize raw stream from {source_ip}: {e}");
            let _ = std::fs::remove_file(&temp_path);
            return None;
        }

        log::info!("raw stream from {source_ip} saved to {}", final_path.display());
        Some(final_path)
    }
}

impl Node {
    fn record_history(&self, packet: &Packet) {
        let entry = match packet {
            Packet::Message(m) => Some(LoggedMessage {
                id: m.id.clone(),
                src: m.src.clone(),
                src_ip: m.src_ip,
                content: m.content.clone(),
                message_type: m.message_type.clone(),
                received_at: std::time::Duration::from_secs_f64(unix_now()),
            }),
            Packet::Broadcast(b) => Some(LoggedMessage {
                id: b.id.clone(),
                src: b.src.clone(),
                src_ip: b.src_ip,
                content: b.content.clone(),
                message_type: b.message_type.clone(),
                received_at: std::time::Duration::from_secs_f64(unix_now()),
            }),
            _ => None,
        };
        if let Some(entry) = entry {
            self.history.lock().expect("history lock poisoned").push(entry);
        }
    }

    fn file_cache_download_dir(&self) -> PathBuf {
        // FileCache owns the canonical download directory; Node keeps no
        // separate copy so there is exactly one source of truth.
        self.file_cache.download_dir()
    }
}
