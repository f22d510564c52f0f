//! Error kinds surfaced over HTTP, grounded in the tagged `InternalRpcError`
//! style from the pack's JSON-RPC error handling, adapted to axum's
//! `IntoResponse` instead of hand-rolled JSON-RPC error envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::ledger::WindowInfo;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadInput(String),

    #[error("suspected score hacking: {reason}")]
    SuspectedScoreHacking {
        reason: String,
        window: Option<WindowInfo>,
    },

    #[error("job not found")]
    JobNotFound,

    #[error("could not reach the wallet-has-username probe: {0}")]
    CheckWalletError(String),

    #[error("account not set up for leaderboard unlock")]
    AccountNotSet,

    #[error("score already maxed, no delta to mint")]
    AlreadyMaxed,

    #[error("leaderboard aggregation failed: {0}")]
    AggregateFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, reason) = match &self {
            ApiError::BadInput(msg) => (StatusCode::BAD_REQUEST, "BAD_INPUT", msg.clone()),
            ApiError::SuspectedScoreHacking { reason, .. } => (
                StatusCode::FORBIDDEN,
                "SUSPECTED_SCORE_HACKING",
                reason.clone(),
            ),
            ApiError::JobNotFound => (
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                "no job with that id".into(),
            ),
            ApiError::CheckWalletError(msg) => {
                (StatusCode::BAD_GATEWAY, "CHECK_WALLET_ERROR", msg.clone())
            }
            ApiError::AccountNotSet => (
                StatusCode::FORBIDDEN,
                "ACCOUNT_NOT_SET",
                "wallet has no username set".into(),
            ),
            ApiError::AlreadyMaxed => (
                StatusCode::CONFLICT,
                "ALREADY_MAXED",
                "wallet already at or above the unlock target".into(),
            ),
            ApiError::AggregateFailed(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AGGREGATE_FAILED", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let mut body = json!({
            "ok": false,
            "code": code,
            "reason": reason,
        });

        if let ApiError::SuspectedScoreHacking { window: Some(w), .. } = &self {
            body["window"] = json!(w);
        }

        (status, axum::Json(body)).into_response()
    }
}
