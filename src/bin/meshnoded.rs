use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meshnet::config::{default_base_dir, NodeConfig};
use meshnet::node::Node;

/// Run a mesh node that discovers peers on the local network, routes
/// messages and files across multiple hops, and optionally bridges to other
/// gateway nodes.
#[derive(Parser, Debug)]
#[command(name = "meshnoded", version, about)]
struct Args {
    /// Directory holding mesh_config.json and the MeshDownloads folder.
    /// Defaults to the user's home directory.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Advertise this node as a hotspot/gateway host.
    #[arg(long)]
    hotspot: bool,

    /// This node's LAN-facing IPv4 address, used as `src_ip` on outgoing
    /// packets. Defaults to the address the OS would use to reach the
    /// public internet.
    #[arg(long)]
    ip: Option<Ipv4Addr>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let base_dir = args.base_dir.unwrap_or_else(default_base_dir);

    let mut config = NodeConfig::load_or_create(&base_dir).map_err(std::io::Error::other)?;
    if args.hotspot && !config.is_hotspot_host {
        config.is_hotspot_host = true;
        config.save().map_err(std::io::Error::other)?;
    }

    let my_ip = args.ip.unwrap_or_else(|| meshnet::net::scanner::local_ip_or_loopback());
    let download_dir = NodeConfig::download_dir(&base_dir);

    log::info!("starting mesh node {} at {my_ip}", config.my_id);
    let node = Arc::new(Node::new(&config, my_ip, download_dir));
    node.run().await
}
