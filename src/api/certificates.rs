use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, CALLER_HEADER};
use crate::issuance::{CallerIdentity, Issuance};
use crate::ledger::{AccountIdentity, LedgerRuntime, TokenId, UnitRecord};

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub recipient: String,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminResponse {
    pub admin: AccountIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastTokenIdResponse {
    /// `0` until the first issuance, see `has_issued`
    pub last_token_id: TokenId,
    pub has_issued: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateResponse {
    pub unit: UnitRecord,
    pub holder: Option<AccountIdentity>,
}

pub async fn issue_certificate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Issuance>)> {
    let caller = caller_from(&headers)?;
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request("InvalidBody", rejection.body_text())
    })?;
    let recipient = AccountIdentity::new(&request.recipient).map_err(|e| {
        ApiError::bad_request("InvalidRecipient", format!("Invalid recipient: {}", e))
    })?;

    let issuance = state
        .contract
        .lock()
        .await
        .issue_with_receipt(&caller, &recipient, &request.reference)
        .await?;

    info!(
        "Certificate {} issued to {} via HTTP",
        issuance.token_id, issuance.recipient
    );
    Ok((StatusCode::CREATED, Json(issuance)))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    Path(token_id): Path<u64>,
) -> ApiResult<Json<CertificateResponse>> {
    let token = TokenId::new(token_id);
    let unit = state.ledger.unit(token).await?.ok_or_else(|| {
        ApiError::not_found(
            "CertificateNotFound",
            format!("No certificate unit with id {}", token_id),
        )
    })?;

    // Supply is one, so at most one account holds it.
    let holder = state
        .ledger
        .holders(token)
        .await?
        .into_iter()
        .next()
        .map(|(account, _)| account);

    Ok(Json(CertificateResponse { unit, holder }))
}

pub async fn get_admin(State(state): State<AppState>) -> Json<AdminResponse> {
    let admin = state.contract.lock().await.get_admin().clone();
    Json(AdminResponse { admin })
}

pub async fn get_last_token_id(State(state): State<AppState>) -> Json<LastTokenIdResponse> {
    let contract = state.contract.lock().await;
    Json(LastTokenIdResponse {
        last_token_id: contract.get_last_token_id(),
        has_issued: contract.state().has_issued(),
    })
}

fn caller_from(headers: &HeaderMap) -> ApiResult<CallerIdentity> {
    let raw = headers
        .get(CALLER_HEADER)
        .ok_or_else(|| {
            ApiError::bad_request(
                "MissingCaller",
                format!("Header {} is required", CALLER_HEADER),
            )
        })?
        .to_str()
        .map_err(|_| {
            ApiError::bad_request(
                "InvalidCaller",
                format!("Header {} must be valid ASCII", CALLER_HEADER),
            )
        })?;

    AccountIdentity::new(raw)
        .map(CallerIdentity::new)
        .map_err(|e| ApiError::bad_request("InvalidCaller", format!("Invalid caller: {}", e)))
}
