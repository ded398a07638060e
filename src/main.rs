use rendezvous::config::Config;
use rendezvous::signaling::SignalingServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().map_err(std::io::Error::other)?;
    let bind_addr = config.bind_addr();

    println!("   Rendezvous Signaling Relay");
    println!("   Binding to ws://{}", bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::bind(&bind_addr).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
