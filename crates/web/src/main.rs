use std::net::SocketAddr;

use tracing::info;

use bikegear_web::SiteServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let web_addr: SocketAddr = std::env::var("BIKEGEAR_WEB_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    info!("Bike Gear storefront v{}", env!("CARGO_PKG_VERSION"));

    SiteServer::new().serve(web_addr).await
}
