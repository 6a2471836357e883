//! Camera relay example
//!
//! Accepts one ingest connection carrying length-prefixed frames and relays
//! every frame to all WebSocket viewers as base64 text.
//!
//! Run with: cargo run --example camera_relay [VIEWER_ADDR] [INGEST_ADDR]
//!
//! Examples:
//!   cargo run --example camera_relay                                  # viewers on 0.0.0.0:8081, ingest on 127.0.0.1:9092
//!   cargo run --example camera_relay 127.0.0.1:8081 127.0.0.1:9000
//!
//! ## Viewing
//!
//! Connect a WebSocket client to ws://localhost:8081/stream. Each text
//! message is one base64-encoded frame (for MJPEG cameras, usable directly
//! as `data:image/jpeg;base64,<message>`).
//!
//! ## Ingest
//!
//! Each frame is a 4-byte big-endian length followed by the payload.

use std::net::SocketAddr;
use std::time::Duration;

use framecast::{BroadcastConfig, FrameService, ServerConfig, ServiceConfig};
use tracing_subscriber::EnvFilter;

fn parse_addr(arg: Option<String>, default: &str) -> Result<SocketAddr, String> {
    let value = arg.unwrap_or_else(|| default.to_string());
    value
        .parse()
        .map_err(|e| format!("invalid address {:?}: {}", value, e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecast=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let viewer_addr = parse_addr(args.next(), "0.0.0.0:8081")?;
    let ingest_addr = parse_addr(args.next(), "127.0.0.1:9092")?;

    let config = ServiceConfig::default()
        .server(ServerConfig::with_addr(viewer_addr).subscriber_buffer(4))
        .broadcast(BroadcastConfig::default().send_timeout(Duration::from_secs(1)))
        .ingest_addr(ingest_addr);

    println!("Camera relay");
    println!("  Viewers: ws://{}/stream", viewer_addr);
    println!("  Ingest:  tcp://{}", ingest_addr);
    println!("Press Ctrl+C to stop\n");

    let service = FrameService::new(config);
    service
        .run_ingest_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = service.stats();
    println!(
        "Stats: frames={} deliveries={} dropped={} evictions={} viewers_total={}",
        stats.frames_received,
        stats.deliveries,
        stats.dropped_frames,
        stats.evictions,
        stats.subscribers_added,
    );

    Ok(())
}
