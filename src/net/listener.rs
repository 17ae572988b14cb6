use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::codec::FrameCodec;
use crate::constants::{FRAME_RECV_TIMEOUT, PORT, RAW_STREAM_TIMEOUT};
use crate::net::dispatcher::Dispatcher;
use crate::net::framing::{read_frame, FrameKind};

/// Accepts TCP connections on `PORT` and dispatches decoded frames.
/// Grounded on `offline_mesh_app/server/listener.py::start_server`/
/// `handle_connection`, reworked around the explicit length+kind framing
/// from SPEC_FULL.md §4.1 rather than the original's best-effort `recv`
/// loop and try-JSON-then-fall-back-to-binary dispatch.
pub struct Listener {
    dispatcher: Arc<dyn Dispatcher>,
    codec: Arc<FrameCodec>,
}

impl Listener {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, codec: Arc<FrameCodec>) -> Self {
        Listener { dispatcher, codec }
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        self.run_on(("0.0.0.0", PORT)).await
    }

    /// Like [`Listener::run`] but binding an explicit address, primarily so
    /// tests can use an ephemeral port instead of the fixed mesh `PORT`.
    pub async fn run_on(self: Arc<Self>, bind_addr: impl tokio::net::ToSocketAddrs + Send + 'static) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        log::info!("listening on {:?}", listener.local_addr());

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let source_ip = match addr.ip() {
                        std::net::IpAddr::V4(v4) => v4,
                        std::net::IpAddr::V6(_) => continue,
                    };
                    log::info!("connection from {source_ip}");
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(stream, source_ip).await {
                            log::debug!("connection from {source_ip} ended with error: {e}");
                        }
                    });
                }
                Err(e) => log::error!("error accepting connection: {e}"),
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, source_ip: Ipv4Addr) -> Result<(), crate::error::MeshError> {
        let (kind, body) = tokio::time::timeout(FRAME_RECV_TIMEOUT, read_frame(&mut stream))
            .await
            .map_err(|_| crate::error::MeshError::MalformedFrame("timed out waiting for frame header".into()))??;

        match kind {
            FrameKind::Packet => {
                let packet = self.codec.decode(&body)?;
                self.dispatcher.dispatch_packet(packet, source_ip).await;
            }
            FrameKind::RawStream => {
                // The marker (if any) arrives as its own `Packet`-kind frame
                // on a preceding connection and is matched by the dispatcher
                // via file_id/source IP; this connection carries only the
                // raw bytes that follow it.
                let mut remainder = body;
                let mut rest = Vec::new();
                let _ = tokio::time::timeout(RAW_STREAM_TIMEOUT, stream.read_to_end(&mut rest)).await;
                remainder.extend_from_slice(&rest);
                self.dispatcher.dispatch_raw_stream(None, source_ip, remainder).await;
            }
        }
        Ok(())
    }
}
