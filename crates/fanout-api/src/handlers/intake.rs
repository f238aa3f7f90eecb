//! Inbound event intake handler.
//!
//! Accepts raw event payloads, stamps them, and hands them to the
//! front-door worker pool so inbound latency is decoupled from dispatch.
//! The payload is forwarded byte-for-byte; no envelope is parsed or added.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use fanout_core::{DeliveryJob, Timestamps};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::AppState;

/// Body returned with a 202.
pub const ACCEPTED_BODY: &str = "Request placed on to queue.\n";
/// Body returned with a 408 when the front-door pool is full.
pub const OVERLOADED_BODY: &str = "Unable to handle request at this time.\n";

/// Header an inbound caller may use to propagate a correlation id.
pub const TRANSACTION_HEADER: &str = "X-Webpa-Transaction-Id";

/// Accepts one inbound event for fan-out.
///
/// Responds 400 for an empty body or a missing/ambiguous `Content-Type`,
/// 408 when the front-door pool is full, and 202 once the event is queued.
#[instrument(name = "accept_event", skip(state, headers, body), fields(target = %uri))]
pub async fn accept_event(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let time_received = state.clock.now_utc();

    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "Empty request body.\n").into_response();
    }

    let mut content_types = headers.get_all(CONTENT_TYPE).iter();
    let content_type = match (content_types.next(), content_types.next()) {
        (Some(value), None) => match value.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "Content-Type is not valid text.\n")
                    .into_response()
            },
        },
        (None, _) => {
            return (StatusCode::BAD_REQUEST, "Content-Type must be set in the header.\n")
                .into_response()
        },
        (Some(_), Some(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                "Content-Type cannot have more than one specification.\n",
            )
                .into_response()
        },
    };

    let transaction_id = headers
        .get(TRANSACTION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut job = DeliveryJob {
        payload: body,
        content_type,
        target_url: uri.to_string(),
        event: String::new(),
        device_id: String::new(),
        transaction_id,
        timestamps: Timestamps { time_received: Some(time_received), time_accepted: None },
    };
    job.timestamps.time_accepted = Some(state.clock.now_utc());

    let wrapper = Arc::clone(&state.wrapper);
    match state.intake_pool.submit(async move { wrapper.queue(job).await }) {
        Ok(()) => (StatusCode::ACCEPTED, ACCEPTED_BODY).into_response(),
        Err(_) => {
            warn!("intake pool full, rejecting event");
            (StatusCode::REQUEST_TIMEOUT, OVERLOADED_BODY).into_response()
        },
    }
}
