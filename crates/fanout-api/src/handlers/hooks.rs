//! Listener registration endpoints.
//!
//! `POST /hook` validates a registration payload and writes it to the
//! listener store; the dispatch set picks it up through the store's
//! snapshot subscription, not directly from this handler. `GET /hook`
//! reads the currently known listeners back out of the store.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fanout_core::Registration;
use tracing::{error, info};

use crate::{registry::RegistryError, AppState};

/// Registration payloads larger than this are rejected outright.
const MAX_REGISTRATION_SIZE: usize = 64 * 1024;

/// Registers or refreshes a listener.
pub async fn update_hooks(State(state): State<AppState>, request: Request) -> Response {
    let address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let body = match axum::body::to_bytes(request.into_body(), MAX_REGISTRATION_SIZE).await {
        Ok(body) => body,
        Err(_) => return message_response(StatusCode::BAD_REQUEST, "unable to read request body"),
    };

    let registration: Registration = match serde_json::from_slice(&body) {
        Ok(registration) => registration,
        Err(e) => return message_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.registry.register(registration, &address).await {
        Ok(listener) => {
            info!(url = %listener.url, address = %listener.address, "listener registered");
            message_response(StatusCode::OK, "Success")
        },
        Err(RegistryError::Invalid(e)) => message_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(RegistryError::Store(e)) => {
            error!(error = %e, "failed to write listener registration");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        },
    }
}

/// Lists the currently registered listeners.
pub async fn list_hooks(State(state): State<AppState>) -> Response {
    match state.registry.listeners().await {
        Ok(listeners) => (StatusCode::OK, Json(listeners)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read listener store");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        },
    }
}

fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}
