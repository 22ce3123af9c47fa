//! The HTTP read API collaborator.
//!
//! `GET /metrics?offset=O&limit=L` calls [`Log::read`] and returns the
//! concatenated lines with the next cursor in an `Offset` header;
//! `GET /metrics/_offset` returns the current write frontier.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::log::{Log, SENTINEL};

const MAX_LIMIT: usize = 1000;
static OFFSET_HEADER: HeaderName = HeaderName::from_static("offset");

#[derive(Clone)]
struct ApiState {
    store: Arc<Log>,
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    offset: Option<i64>,
    limit: Option<i64>,
}

pub fn router(store: Arc<Log>) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/metrics/_offset", get(get_offset))
        .with_state(ApiState { store })
}

async fn get_metrics(State(state): State<ApiState>, Query(q): Query<MetricsQuery>) -> Response {
    let offset = match q.offset {
        Some(o) if o >= 0 => o as u64,
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    let limit = match q.limit {
        None => MAX_LIMIT,
        Some(l) if l > 0 => (l as usize).min(MAX_LIMIT),
        Some(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let (lines, next_offset) = match state.store.read(offset, limit) {
        Ok(v) => v,
        Err(err) => {
            log::error!(target: "carbon_pool::readapi", "read({offset}, {limit}) failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if next_offset == SENTINEL {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut response = lines.into_response();
    response.headers_mut().insert(
        OFFSET_HEADER.clone(),
        HeaderValue::from_str(&next_offset.to_string()).expect("decimal is valid header value"),
    );
    response
}

async fn get_offset(State(state): State<ApiState>) -> String {
    state.store.offset().to_string()
}
