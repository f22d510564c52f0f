//! Request/response JSON shapes for the HTTP surface.
//!
//! The 200-mined vs 202-queued reply is a genuinely different JSON shape
//! per variant, so `SubmitReply` (in `submission.rs`) renders itself rather
//! than being squeezed through one `#[derive(Serialize)]` struct.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ethers::utils::to_checksum;
use serde::Deserialize;
use serde_json::json;

use crate::submission::SubmitReply;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreRequest {
    pub wallet_address: serde_json::Value,
    pub score: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub wallet_address: serde_json::Value,
    #[serde(default)]
    pub game_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub game_id: Option<u64>,
}

impl IntoResponse for SubmitReply {
    fn into_response(self) -> Response {
        match self {
            SubmitReply::Mined {
                tx_hash,
                block_number,
                status,
                gas_used,
                to,
                from,
                nonce,
            } => (
                StatusCode::OK,
                axum::Json(json!({
                    "ok": true,
                    "txHash": format!("{tx_hash:?}"),
                    "blockNumber": block_number,
                    "status": status,
                    "gasUsed": gas_used.to_string(),
                    "to": to_checksum(&to, None),
                    "from": to_checksum(&from, None),
                    "nonce": nonce,
                })),
            )
                .into_response(),
            SubmitReply::QueuedAck {
                job_id,
                nonce,
                ack_ms,
            } => with_job_header(
                job_id,
                (
                    StatusCode::ACCEPTED,
                    axum::Json(json!({
                        "ok": true,
                        "queued": true,
                        "jobId": job_id,
                        "statusUrl": format!("/api/v1/jobs/{job_id}"),
                        "nonce": nonce,
                        "ackMs": ack_ms,
                    })),
                )
                    .into_response(),
            ),
            SubmitReply::QueuedFailsafe {
                job_id,
                approx_batch_in_ms,
            } => with_job_header(
                job_id,
                (
                    StatusCode::ACCEPTED,
                    axum::Json(json!({
                        "ok": true,
                        "queued": true,
                        "jobId": job_id,
                        "statusUrl": format!("/api/v1/jobs/{job_id}"),
                        "approxBatchInMs": approx_batch_in_ms,
                    })),
                )
                    .into_response(),
            ),
            SubmitReply::ScoreHacking { reason, window } => (
                StatusCode::FORBIDDEN,
                axum::Json(json!({
                    "ok": false,
                    "code": "SUSPECTED_SCORE_HACKING",
                    "reason": reason,
                    "window": window,
                })),
            )
                .into_response(),
            SubmitReply::SendFailed { code, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "error": "Transaction failed",
                    "code": code,
                    "reason": reason,
                })),
            )
                .into_response(),
            SubmitReply::WaitTimeout { job_id } => with_job_header(
                job_id,
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    axum::Json(json!({
                        "ok": false,
                        "code": "TX_WAIT_TIMEOUT",
                        "reason": "receipt not observed within TX_TIMEOUT_MS",
                        "jobId": job_id,
                    })),
                )
                    .into_response(),
            ),
        }
    }
}

fn with_job_header(job_id: uuid::Uuid, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
        response.headers_mut().insert("X-Job-Id", value);
    }
    response
}
