use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use meshnet::config::NodeConfig;
use meshnet::constants::PORT;
use meshnet::node::Node;

/// Starts a node bound to `ip:PORT` with the given id and known peers,
/// backed by a fresh temp directory for its config and downloads. Returns
/// the node handle and the `TempDir`, which must stay alive for as long as
/// the caller needs the download directory to exist.
pub async fn spawn_node(ip: Ipv4Addr, id: &str, peers: &[Ipv4Addr]) -> (Arc<Node>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");

    let mut config = NodeConfig::load_or_create(dir.path()).expect("create config");
    config.my_id = id.into();
    config.known_peers = peers.to_vec();
    config.save().expect("save config");

    let download_dir = NodeConfig::download_dir(dir.path());
    let node = Arc::new(Node::new(&config, ip, download_dir));

    let running = Arc::clone(&node);
    tokio::spawn(async move {
        let _ = running.run_on((ip, PORT)).await;
    });
    // Give the listener a moment to bind before the caller starts sending.
    tokio::time::sleep(Duration::from_millis(100)).await;

    (node, dir)
}
