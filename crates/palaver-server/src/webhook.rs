//! Identity-provider webhook: keeps the user directory in sync.
//!
//! The provider posts `user.created` / `user.updated` / `user.deleted`
//! events.  A malformed payload must never crash the receiver: the body is
//! parsed leniently and every failure is answered with a 500 after logging,
//! acknowledging that receipt was attempted (no retry orchestration here).

use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;

use palaver_engine::IdentityEvent;

use crate::api::AppState;

pub async fn identity_webhook(State(state): State<AppState>, body: String) -> StatusCode {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "identity webhook: unparseable payload");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let Some(event) = event_from_payload(&payload) else {
        // Unknown event kinds are acknowledged and skipped.
        tracing::debug!(
            kind = payload.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
            "identity webhook: ignoring event"
        );
        return StatusCode::OK;
    };

    match state.engine.apply_identity_event(event) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!(error = %e, "identity webhook: processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Map the provider's wire shape onto a normalized [`IdentityEvent`].
///
/// `created` and `updated` both become upserts.  Missing profile fields fall
/// back the way the provider's own SDK does: first email address or empty,
/// "First Last" else username else "User".
fn event_from_payload(payload: &Value) -> Option<IdentityEvent> {
    let kind = payload.get("type")?.as_str()?;
    let data = payload.get("data")?;
    let external_id = data.get("id")?.as_str()?.to_string();

    match kind {
        "user.created" | "user.updated" => {
            let email = data
                .get("email_addresses")
                .and_then(|a| a.get(0))
                .and_then(|e| e.get("email_address"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let first = data.get("first_name").and_then(Value::as_str);
            let last = data.get("last_name").and_then(Value::as_str);
            let display_name = match (first, last) {
                (Some(f), Some(l)) => format!("{f} {l}"),
                _ => data
                    .get("username")
                    .and_then(Value::as_str)
                    .unwrap_or("User")
                    .to_string(),
            };

            let avatar_url = data
                .get("image_url")
                .and_then(Value::as_str)
                .map(str::to_string);

            Some(IdentityEvent::Upserted {
                external_id,
                email,
                display_name,
                avatar_url,
            })
        }
        "user.deleted" => Some(IdentityEvent::Deleted { external_id }),
        _ => None,
    }
}
