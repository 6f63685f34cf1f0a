use std::sync::Arc;

use clap::Parser;
use meshcall::{
    call::{Call, JoinOptions},
    config::MeshConfig,
    error::Error,
    media::NoDevices,
    rtc::RtcConnectionFactory,
    websocket::WebSocketSignaling,
};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Headless meshcall participant. It has no devices, so it sends placeholder media.
#[derive(Parser, Debug)]
#[command(name = "mesh-client", version)]
struct Args {
    /// WebSocket URL of the relay.
    #[arg(long, env = "MESH_RELAY_URL", default_value = "ws://127.0.0.1:4000/socket")]
    url: String,

    #[arg(long, env = "MESH_ROOM")]
    room: String,

    #[arg(long, env = "MESH_USERNAME", default_value = "headless")]
    username: String,

    /// STUN or TURN server URL. Repeat for several servers.
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = MeshConfig::default();
    if !args.ice_servers.is_empty() {
        config = config.with_ice_servers(args.ice_servers);
    }

    let mut options = JoinOptions::new(args.room, args.username);
    options.placeholder = config.placeholder.clone();

    let (call, handle) = Call::join(
        options,
        Arc::new(WebSocketSignaling::new(args.url)),
        Arc::new(NoDevices),
        Arc::new(RtcConnectionFactory::new(config)),
    )
    .await?;

    let mut peers = handle.peers.clone();
    tokio::spawn(async move {
        while peers.changed().await.is_ok() {
            let list = peers.borrow_and_update().clone();
            tracing::info!("peer list revision {}", list.revision);
            for peer in list.peers.iter() {
                let tracks = peer.stream.as_ref().map(|s| s.tracks.len()).unwrap_or(0);
                tracing::info!("  {} {:?} tracks={}", peer.participant_id, peer.state, tracks);
            }
        }
    });

    let hangup = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("hanging up");
            hangup.hangup();
        }
    });

    let reason = call.run().await;
    tracing::info!("call ended: {:?}", reason);
    Ok(())
}
