use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/webhook", post(webhook::webhook))
}

async fn health() -> &'static str { concat!("recipe-bot ", env!("CARGO_PKG_VERSION"), " is running\n") }
