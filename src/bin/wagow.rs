use clap::Parser;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use wagow::http;
use wagow::udp::UdpClient;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "WAGOW_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// Local address of the UDP socket magic packets are sent from. Defaults
    /// to an ephemeral port on all interfaces, dual stack when available.
    #[arg(long, env = "WAGOW_BIND_ADDR")]
    bind_addr: Option<SocketAddr>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("unable to listen for interrupt: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down server...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let client = Arc::new(match args.bind_addr {
        Some(addr) => UdpClient::bind(addr)?,
        None => UdpClient::new()?,
    });
    info!("Sending magic packets from {}", client.local_addr());

    let app = http::router(client.clone());

    info!("Starting server on {}...", args.http_addr);
    axum::Server::bind(&args.http_addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    client.close();
    Ok(())
}
