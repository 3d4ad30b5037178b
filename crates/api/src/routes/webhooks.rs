//! Payment provider webhook endpoint
//!
//! Mounted outside tenant resolution: the tenant comes from the signed
//! payload, never from the host the provider calls.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use campus_billing::signature::SIGNATURE_HEADER;
use serde_json::json;

use crate::state::AppState;

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.billing.webhooks.reconcile(&body, signature).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "reason": outcome.status()})),
        )
            .into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({"status": "error", "reason": e.reason()})),
            )
                .into_response()
        }
    }
}
