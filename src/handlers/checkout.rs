use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ServiceError, UploadError};
use crate::handlers::common::{created_response, no_content_response, success_response};
use crate::models::{Cart, CartLine, EvidenceFile, PaymentMode};
use crate::services::checkout::{AddressInput, ProofDetailsInput};
use crate::services::pricing::ShippingChoice;
use crate::AppState;

/// Headroom on top of the evidence ceiling for multipart boundaries and part
/// headers, so a file of exactly `evidence_max_bytes` still fits on the wire.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the router for checkout endpoints.
///
/// The evidence route gets its own body limit derived from the configured
/// ceiling; the framework default is smaller and would cut uploads off
/// before the workflow's own size check could report them.
pub fn checkout_routes(evidence_max_bytes: usize) -> Router<AppState> {
    let evidence_body_limit = evidence_max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route("/sessions", post(start_session))
        .route(
            "/sessions/:session_id",
            get(get_session).delete(abandon_session),
        )
        .route("/sessions/:session_id/address", put(set_address))
        .route("/sessions/:session_id/payment-mode", put(set_payment_mode))
        .route("/sessions/:session_id/shipping", put(set_shipping))
        .route(
            "/sessions/:session_id/coupon",
            post(apply_coupon).delete(remove_coupon),
        )
        .route(
            "/sessions/:session_id/proof-capture",
            post(begin_proof_capture),
        )
        .route("/sessions/:session_id/proof", put(set_proof_details))
        .route(
            "/sessions/:session_id/evidence",
            post(upload_evidence).layer(DefaultBodyLimit::max(evidence_body_limit)),
        )
        .route("/sessions/:session_id/submit", post(submit))
}

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    cart_id: Uuid,
    lines: Vec<CartLine>,
}

/// Start a checkout session from a cart snapshot
async fn start_session(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .checkout
        .start_session(Cart::new(payload.cart_id, payload.lines))
        .await?;
    Ok(created_response(session))
}

/// Get the current session snapshot
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.checkout.session(session_id)?))
}

/// Capture delivery address and contact details
async fn set_address(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.checkout.submit_address(session_id, payload).await?;
    Ok(success_response(session))
}

#[derive(Debug, Deserialize)]
struct PaymentModeRequest {
    payment_mode: PaymentMode,
}

/// Select COD or advance settlement
async fn set_payment_mode(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<PaymentModeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .checkout
        .select_payment_mode(session_id, payload.payment_mode)?;
    Ok(success_response(session))
}

#[derive(Debug, Deserialize)]
struct ShippingRequest {
    shipping: ShippingChoice,
}

/// Select standard or express shipping
async fn set_shipping(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ShippingRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .checkout
        .select_shipping(session_id, payload.shipping)?;
    Ok(success_response(session))
}

#[derive(Debug, Deserialize)]
struct CouponRequest {
    code: String,
}

/// Validate and apply a coupon code
async fn apply_coupon(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .checkout
        .apply_coupon(session_id, &payload.code)
        .await?;
    Ok(success_response(session))
}

/// Remove the applied coupon
async fn remove_coupon(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.checkout.remove_coupon(session_id).await?;
    Ok(success_response(session))
}

/// Enter the proof-capture step (advance mode only)
async fn begin_proof_capture(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.checkout.begin_proof_capture(session_id)?;
    Ok(success_response(session))
}

/// Record wallet transfer details
async fn set_proof_details(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ProofDetailsInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.checkout.set_proof_details(session_id, payload)?;
    Ok(success_response(session))
}

/// Maps a multipart read failure onto the upload taxonomy. A tripped body
/// limit surfaces as `LengthLimitError` somewhere in the source chain and
/// means the file was over the ceiling, not that the transport broke.
fn map_multipart_error(e: MultipartError, max_bytes: usize) -> ServiceError {
    let mut source = std::error::Error::source(&e);
    while let Some(inner) = source {
        if inner
            .downcast_ref::<http_body_util::LengthLimitError>()
            .is_some()
        {
            return UploadError::TooLarge {
                size: max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
                limit: max_bytes,
            }
            .into();
        }
        source = inner.source();
    }
    UploadError::Transport(e.to_string()).into()
}

/// Upload the payment evidence screenshot (multipart, field `file`)
async fn upload_evidence(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let max_bytes = state.config.evidence_max_bytes;
    let field = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, max_bytes))?
        .ok_or_else(|| {
            ServiceError::ValidationError("multipart field 'file' is required".to_string())
        })?;

    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let file_name = field.file_name().map(|s| s.to_string());
    let bytes = field
        .bytes()
        .await
        .map_err(|e| map_multipart_error(e, max_bytes))?;

    let session = state
        .checkout
        .attach_evidence(
            session_id,
            EvidenceFile {
                bytes,
                content_type,
                file_name,
            },
        )
        .await?;
    Ok(success_response(session))
}

#[derive(Debug, Deserialize, Default)]
struct SubmitRequest {
    #[serde(default)]
    terms_accepted: bool,
}

/// Submit the order; at most one order is created per session
async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    payload: Option<Json<SubmitRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let terms_accepted = payload.map(|Json(p)| p.terms_accepted).unwrap_or(false);
    let order = state.checkout.submit(session_id, terms_accepted).await?;
    Ok(created_response(order))
}

/// Abandon the session (refused while a submission is in flight)
async fn abandon_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.checkout.abandon(session_id).await?;
    Ok(no_content_response())
}
