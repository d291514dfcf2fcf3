//! Web server implementation

use crate::static_files::StaticFiles;
use axum::{
    http::Uri,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Storefront web server
#[derive(Debug, Clone, Default)]
pub struct SiteServer {
    files: StaticFiles,
}

impl SiteServer {
    pub fn new() -> Self {
        Self {
            files: StaticFiles::new(),
        }
    }

    /// Build the router: health check plus the embedded pages
    pub fn router(&self) -> Router {
        let files = self.files;

        Router::new()
            .route("/health", get(health_handler))
            .fallback(move |uri: Uri| async move { static_handler(files, uri) })
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Storefront starting on http://{}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Storefront listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Storefront stopped");
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bikegear-web"
    }))
}

fn static_handler(files: StaticFiles, uri: Uri) -> Response {
    debug!("GET {}", uri.path());
    files.serve(uri.path())
}
