use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use parking_lot::Mutex;

use crate::coordinator::{TransformState, TransformStore};
use crate::foundation::error::{ReelError, ReelResult};

/// Default bind address for a standalone coordinator.
pub const DEFAULT_BIND: &str = "127.0.0.1:7007";

pub type SharedStore = Arc<Mutex<TransformStore>>;

/// Build the coordinator router: `GET /` reads, `POST /` proposes.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(get_transform).post(post_transform))
        .with_state(store)
}

async fn get_transform(State(store): State<SharedStore>) -> Json<TransformState> {
    Json(store.lock().current())
}

async fn post_transform(
    State(store): State<SharedStore>,
    Json(candidate): Json<TransformState>,
) -> Json<TransformState> {
    let mut guard = store.lock();
    let before = guard.current();
    let after = guard.apply(candidate);
    if after != before {
        tracing::debug!(
            transform_x = after.transform_x,
            transform_y = after.transform_y,
            "transform center updated"
        );
    }
    Json(after)
}

// Requests are accepted on a single thread; the store lock is never contended across threads.
fn build_runtime() -> ReelResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build coordinator runtime")
        .map_err(ReelError::from)
}

/// Run a coordinator on `bind` until the process exits.
pub fn serve_forever(bind: SocketAddr, initial: TransformState) -> ReelResult<()> {
    let runtime = build_runtime()?;
    let store: SharedStore = Arc::new(Mutex::new(TransformStore::new(initial)));
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind coordinator on {bind}"))?;
        tracing::info!(bind = %bind, "coordinator listening");
        axum::serve(listener, router(store))
            .await
            .context("coordinator server error")?;
        Ok::<(), ReelError>(())
    })
}

/// A coordinator hosted on a background thread for the duration of one run.
pub struct CoordinatorHandle {
    addr: SocketAddr,
    store: SharedStore,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<ReelResult<()>>>,
}

impl CoordinatorHandle {
    /// Bind `bind` (use port 0 for an ephemeral port) and start serving.
    pub fn spawn(bind: SocketAddr, initial: TransformState) -> ReelResult<Self> {
        let listener = std::net::TcpListener::bind(bind)
            .with_context(|| format!("failed to bind coordinator on {bind}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to make coordinator listener non-blocking")?;
        let addr = listener
            .local_addr()
            .context("failed to read coordinator address")?;

        let store: SharedStore = Arc::new(Mutex::new(TransformStore::new(initial)));
        let app = router(store.clone());
        let runtime = build_runtime()?;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("zoomreel-coordinator".to_string())
            .spawn(move || -> ReelResult<()> {
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)
                        .context("failed to register coordinator listener")?;
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async {
                            let _ = rx.await;
                        })
                        .await
                        .context("coordinator server error")?;
                    Ok::<(), ReelError>(())
                })
            })
            .context("failed to spawn coordinator thread")?;

        tracing::info!(addr = %addr, "coordinator started");
        Ok(Self {
            addr,
            store,
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    /// Base URL workers should use.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn current(&self) -> TransformState {
        self.store.lock().current()
    }

    /// Stop serving and wait for the server thread.
    pub fn shutdown(mut self) -> ReelResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> ReelResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ReelError::coordinator("coordinator thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
