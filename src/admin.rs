//! Admin HTTP surface: a liveness banner and on-demand room code minting.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/generate-code", get(generate_code))
}

async fn banner() -> &'static str {
    "rendezvous-server: signaling relay for 1:1 WebRTC calls\n"
}

async fn generate_code(State(state): State<AppState>) -> Response {
    match state.coordinator.generate_code() {
        Ok(code) => code.to_string().into_response(),
        Err(err) => err.into_response(),
    }
}
