use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub mod dto;
pub mod error;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod store;
pub mod stream_handler;

pub fn router(state: &AppState) -> Router<AppState> {
    let upload_routes = Router::new()
        .route("/upload_video", post(handler::upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    Router::new()
        .route("/video_stream/{video_id}/{*filename}", get(stream_handler::stream_video))
        .route("/status", get(handler::list_jobs))
        .route("/status/{video_id}", get(handler::get_status))
        .route("/cancel/{video_id}", post(handler::cancel_job))
        .route("/events", get(handler::events))
        .merge(upload_routes)
}
