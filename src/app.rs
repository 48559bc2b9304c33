use crate::state::AppState;
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes(&state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serves the app until `signal` resolves.
///
/// The job manager is shut down as soon as the signal fires, before the
/// HTTP drain, so event streams close and waiting uploads resolve.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let jobs = state.jobs.clone();
    let app = create_app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down transcoder workers...");
            jobs.shutdown().await;
        })
        .await
}
