use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::time::interval;

use crate::cache::{FileCache, MessageCache};
use crate::codec::FrameCodec;
use crate::constants::{
    BROADCAST_INTERVAL, CACHE_GC_INTERVAL, FILE_CACHE_MAX_AGE, GATEWAY_BROADCAST_INTERVAL, MESSAGE_CACHE_MAX_AGE,
};
use crate::net::sender::send_to_peer;
use crate::packet::{gateway_update_packet, NodeId};
use crate::router::Router;

/// Periodically broadcasts this node's link state to its neighbors and
/// prunes stale routes afterward. Grounded on the broadcast loop implicit
/// in `offline_mesh_app/client/sender.py`/`routing/router.py`, since the
/// original drove broadcasting from a bare `while True` loop in `main.py`.
pub async fn run_link_state_broadcast(router: Arc<Router>, codec: Arc<FrameCodec>, my_id: NodeId, my_ip: Ipv4Addr) -> ! {
    let mut ticker = interval(BROADCAST_INTERVAL);
    loop {
        ticker.tick().await;

        let (link_state, seq) = router.get_link_state(my_ip);
        let packet = crate::packet::Packet::Routing(crate::packet::RoutingPacket {
            id: crate::packet::new_message_id(),
            src: my_id.clone(),
            src_ip: my_ip,
            ttl: crate::constants::MAX_TTL,
            timestamp: unix_now(),
            hops: Vec::new(),
            multi_hop: true,
            link_state,
            seq,
        });

        match codec.encode(&packet) {
            Ok(frame) => {
                for ip in router.neighbors() {
                    send_to_peer(ip, &frame, 1).await;
                }
            }
            Err(e) => log::error!("failed to encode link-state broadcast: {e}"),
        }

        let expired = router.cleanup_stale_routes();
        if expired > 0 {
            log::debug!("expired {expired} stale routes");
        }
    }
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Shares this node's known peer list with other gateway nodes, gated on
/// `is_hotspot_host`. Grounded on
/// `offline_mesh_app/client/gateway_discovery.py::share_peers_with_gateways`.
pub async fn run_gateway_sharing(router: Arc<Router>, codec: Arc<FrameCodec>, my_id: NodeId, my_ip: Ipv4Addr) -> ! {
    let mut ticker = interval(GATEWAY_BROADCAST_INTERVAL);
    loop {
        ticker.tick().await;

        let peers = router.neighbors();
        let gateway_ips: Vec<Ipv4Addr> = router
            .get_all_routes()
            .values()
            .filter(|r| r.is_gateway)
            .map(|r| r.next_hop)
            .collect();

        if gateway_ips.is_empty() {
            continue;
        }

        log::info!("sharing peer list with {} gateway nodes", gateway_ips.len());
        let packet = gateway_update_packet(my_id.clone(), my_ip, true, peers);
        match codec.encode(&packet) {
            Ok(frame) => {
                for ip in gateway_ips {
                    send_to_peer(ip, &frame, 2).await;
                }
            }
            Err(e) => log::error!("failed to encode gateway update: {e}"),
        }
    }
}

/// Periodically evicts stale cache entries. Grounded on
/// `offline_mesh_app/server/handler.py::start_cleanup_thread`.
pub async fn run_cache_gc(message_cache: Arc<MessageCache>, file_cache: Arc<FileCache>) -> ! {
    let mut ticker = interval(CACHE_GC_INTERVAL);
    loop {
        ticker.tick().await;

        let msgs = message_cache.remove_old_messages(MESSAGE_CACHE_MAX_AGE);
        if msgs > 0 {
            log::info!("removed {msgs} stale cached messages");
        }
        let files = file_cache.remove_old_files(FILE_CACHE_MAX_AGE);
        if files > 0 {
            log::info!("removed {files} stale cached file transfers");
        }
    }
}
