use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use siprelay_proxy_core::Dispatcher;
use siprelay_sip_core::parse_message;
use siprelay_sip_transport::{Transport, UdpTransport};
use siprelay_transaction_core::TransactionRegistry;

// Large enough for any realistic UDP SIP message.
const RECV_BUFFER_SIZE: usize = 8192;

#[derive(Parser, Debug)]
#[command(name = "siprelay", about = "Stateful SIP UDP proxy", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5060")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let socket = UdpTransport::bind(args.addr)
        .await
        .with_context(|| format!("cannot listen on {}", args.addr))?;
    let local_addr = socket.local_addr().context("cannot read local address")?;
    info!(%local_addr, "listening");

    let registry = Arc::new(TransactionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, source) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                error!(error = %e, "UDP receive failed");
                continue;
            }
        };
        let datagram = buffer[..len].to_vec();
        debug!(bytes = len, %source, "received datagram");

        let socket = socket.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let message = match parse_message(&datagram) {
                Ok(message) => message,
                Err(e) => {
                    warn!(%source, error = %e, "dropping unparseable datagram");
                    return;
                }
            };
            let transport: Arc<dyn Transport> =
                Arc::new(UdpTransport::new(socket, local_addr, source));
            dispatcher.handle(message, transport).await;
        });
    }
}
