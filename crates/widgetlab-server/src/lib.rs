//! widgetlab dev server.
//!
//! Serves the widget source API used by the editor and the benchmark browser, the
//! example gallery, the library catalog, and a server-rendered viewer page at `/`.

pub mod api;
pub mod error;
pub mod viewer;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;
use widgetlab_core::{CompileOptions, RenderSupervisor, WidgetStore};

pub use error::{ApiError, ApiResult};

/// Default listen address; the benchmark renderer expects it.
pub const DEFAULT_ADDR: &str = "127.0.0.1:43073";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Project root holding the example widget, `.local/` and `examples/`.
    pub root: PathBuf,
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            addr: SocketAddr::from(([127, 0, 0, 1], 43073)),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: WidgetStore,
    pub options: Arc<CompileOptions>,
    pub supervisor: Arc<Mutex<RenderSupervisor>>,
}

impl AppState {
    pub fn new(store: WidgetStore, options: CompileOptions) -> Self {
        Self {
            store,
            options: Arc::new(options),
            supervisor: Arc::new(Mutex::new(RenderSupervisor::new())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(viewer::viewer_page))
        .route(
            "/api/widget/source",
            get(api::get_source)
                .put(api::put_source)
                .delete(api::delete_source),
        )
        .route("/api/widget/examples", get(api::list_examples))
        .route("/api/widget/examples/", get(api::missing_example_id))
        .route("/api/widget/examples/{id}", get(api::get_example))
        .route("/api/widget/catalog", get(api::get_catalog))
        .with_state(state)
}

/// Bind `config.addr` and serve in a background task.
///
/// Returns the bound address, which differs from the requested one when port 0 is used.
pub async fn spawn(
    config: &ServerConfig,
    options: CompileOptions,
) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    let addr = listener.local_addr().context("read bound address")?;
    let app = router(AppState::new(WidgetStore::new(&config.root), options));
    info!(%addr, root = %config.root.display(), "widgetlab server listening");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.context("serve http")
    });
    Ok((addr, handle))
}

/// Serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, options: CompileOptions) -> Result<()> {
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    let app = router(AppState::new(WidgetStore::new(&config.root), options));
    info!(addr = %config.addr, root = %config.root.display(), "widgetlab server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await
        .context("serve http")
}
