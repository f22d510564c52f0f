//! Endpoint handlers. The actual submission plumbing - reserve, enqueue,
//! arm the failsafe timer, suspend on the once-only reply - lives in
//! `enqueue_submission`; the two HTTP entry points (`submit_score`,
//! `unlock_all`) differ only in how they produce the
//! `(wallet_address, score, skip_window)` triple.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ethers::types::Address;
use ethers::utils::to_checksum;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::dto::{LeaderboardQuery, SubmitScoreRequest, UnlockRequest};
use crate::http::AppState;
use crate::jobs::JobRecord;
use crate::ledger::ReserveOutcome;
use crate::pending::PendingQueue;
use crate::submission::{ReplyHandle, Submission, SubmitReply};

/// Unlock target score: `delta = 1200 - currentScore`.
const UNLOCK_TARGET_SCORE: i64 = 1200;

/// Default `gameId` used when the query/body omits one.
const DEFAULT_GAME_ID: u64 = 64;

pub async fn submit_score(
    State(state): State<AppState>,
    Json(req): Json<SubmitScoreRequest>,
) -> Response {
    let outcome = async {
        let (wallet_address, addr_lower) = parse_wallet(&req.wallet_address)?;
        let score = parse_score(&req.score)?;
        enqueue_submission(&state, wallet_address, addr_lower, score, false).await
    }
    .await;

    match outcome {
        Ok(reply) => reply.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn unlock_all(
    State(state): State<AppState>,
    Json(req): Json<UnlockRequest>,
) -> Response {
    let outcome = async {
        let (wallet_address, addr_lower) = parse_wallet(&req.wallet_address)?;
        let wallet: Address = wallet_address
            .parse()
            .map_err(|_| ApiError::BadInput("walletAddress is not a syntactically valid EVM address".into()))?;
        let game_id = req.game_id.unwrap_or(DEFAULT_GAME_ID);

        let has_username = state
            .wallet_probe
            .has_username(wallet)
            .await
            .map_err(|e| ApiError::CheckWalletError(format!("{e:?}")))?;
        if !has_username {
            return Err(ApiError::AccountNotSet);
        }

        let current_score = state
            .leaderboard
            .current_score(game_id, &addr_lower)
            .await
            .map_err(|e| ApiError::AggregateFailed(format!("{e:?}")))?;

        let delta = UNLOCK_TARGET_SCORE - current_score as i64;
        if delta <= 0 {
            return Err(ApiError::AlreadyMaxed);
        }

        enqueue_submission(&state, wallet_address, addr_lower, delta as u64, true).await
    }
    .await;

    match outcome {
        Ok(reply) => reply.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return ApiError::JobNotFound.into_response();
    };
    match state.jobs.get(id) {
        Some(record) => (StatusCode::OK, Json(render_job(id, &record))).into_response(),
        None => ApiError::JobNotFound.into_response(),
    }
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(q): Query<LeaderboardQuery>,
) -> Response {
    let game_id = q.game_id.unwrap_or(DEFAULT_GAME_ID);
    match state.leaderboard.get(game_id).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => ApiError::AggregateFailed(format!("{e:?}")).into_response(),
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    let stats = state.stats.snapshot();
    let common = json!({
        "queueDepth": state.pending.len(),
        "windowMs": state.config.score_window_ms,
        "perMinuteLimit": state.config.score_per_min_limit,
        "eventRange": [state.config.min_score_event, state.config.max_score_event],
        "confirmations": state.config.tx_confirmations,
        "txTimeoutMs": state.config.tx_timeout_ms,
        "batchIntervalMs": state.config.batch_interval_ms,
        "respondAfterMs": state.config.respond_after_ms,
        "dispatch": {
            "ticks": stats.ticks,
            "sent": stats.sent,
            "mined": stats.mined,
            "failed": stats.failed,
        },
    });

    match state.chain.latest_block_number().await {
        Ok(block_number) => {
            let mut body = json!({
                "status": "ok",
                "chainId": state.chain.chain_id,
                "blockNumber": block_number,
                "signerAddress": to_checksum(&state.chain.signer_address, None),
            });
            merge(&mut body, common);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            warn!("health check: RPC call failed: {e:?}");
            let mut body = json!({
                "status": "degraded",
                "error": format!("{e:?}"),
            });
            merge(&mut body, common);
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

fn merge(target: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(target), serde_json::Value::Object(extra)) = (target.as_object_mut(), extra) {
        target.extend(extra);
    }
}

/// Shared tail of both the ordinary and unlock submission paths: reserve
/// against the ledger unless privileged, create the job record, enqueue,
/// arm the failsafe timer, and suspend on the once-only reply.
async fn enqueue_submission(
    state: &AppState,
    wallet_address: String,
    addr_lower: String,
    score: u64,
    skip_window: bool,
) -> Result<SubmitReply, ApiError> {
    if !skip_window && (score < state.config.min_score_event || score > state.config.max_score_event) {
        return Err(ApiError::SuspectedScoreHacking {
            reason: format!(
                "score {score} outside allowed event range [{}, {}]",
                state.config.min_score_event, state.config.max_score_event
            ),
            window: None,
        });
    }

    let job_id = Uuid::new_v4();

    let reservation_held = if skip_window {
        false
    } else {
        match state.ledger.reserve(&addr_lower, score, job_id) {
            ReserveOutcome::Ok => true,
            ReserveOutcome::Denied(window) => {
                return Err(ApiError::SuspectedScoreHacking {
                    reason: "per-wallet window cap exceeded".into(),
                    window: Some(window),
                });
            }
        }
    };

    state
        .jobs
        .put(job_id, JobRecord::queued(wallet_address.clone(), score, skip_window));

    let (tx, rx) = oneshot::channel();
    let reply = ReplyHandle::new(tx);

    arm_failsafe_timer(&state.config, job_id, &reply);

    let submission = Submission::new(
        job_id,
        wallet_address,
        addr_lower,
        score,
        skip_window,
        reservation_held,
        reply,
    );
    push_submission(&state.pending, submission);

    rx.await
        .map_err(|_| ApiError::Internal("reply channel closed before a reply was produced".into()))
}

fn arm_failsafe_timer(config: &Arc<crate::config::Config>, job_id: Uuid, reply: &ReplyHandle) {
    let hard = config.request_hard_timeout();
    let approx_batch_in_ms = config.batch_interval_ms;
    let failsafe_reply = reply.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(hard).await;
        failsafe_reply.try_reply(SubmitReply::QueuedFailsafe {
            job_id,
            approx_batch_in_ms,
        });
    });
    reply.set_failsafe_handle(task.abort_handle());
}

fn push_submission(pending: &Arc<PendingQueue>, submission: Submission) {
    pending.push_back(submission);
}

fn render_job(id: Uuid, r: &JobRecord) -> serde_json::Value {
    let mut body = json!({
        "ok": true,
        "jobId": id,
        "status": r.status,
        "walletAddress": r.wallet_address,
        "score": r.score,
        "unlockAll": r.unlock_all,
    });

    if let Some(nonce) = r.nonce {
        body["nonce"] = json!(nonce);
    }
    if let Some(tx_hash) = r.tx_hash {
        body["txHash"] = json!(format!("{tx_hash:?}"));
    }
    if let Some(block_number) = r.block_number {
        body["blockNumber"] = json!(block_number);
    }
    if let Some(gas_used) = r.gas_used {
        body["gasUsed"] = json!(gas_used.to_string());
    }
    if let Some(receipt_status) = r.receipt_status {
        body["receiptStatus"] = json!(receipt_status.as_u64());
    }
    if let Some(to) = r.to {
        body["to"] = json!(to_checksum(&to, None));
    }
    if let Some(from) = r.from {
        body["from"] = json!(to_checksum(&from, None));
    }
    if let Some(code) = &r.code {
        body["code"] = json!(code);
    }
    if let Some(reason) = &r.reason {
        body["reason"] = json!(reason);
    }

    body
}

/// Parse `walletAddress`: must be a JSON string that is a syntactically
/// valid EVM address. Returns the original string and its
/// lowercase-canonical form used for ledger/cache keying.
fn parse_wallet(value: &serde_json::Value) -> Result<(String, String), ApiError> {
    let s = value
        .as_str()
        .ok_or_else(|| ApiError::BadInput("walletAddress must be a string".into()))?;
    let addr: Address = s
        .parse()
        .map_err(|_| ApiError::BadInput("walletAddress is not a syntactically valid EVM address".into()))?;
    let addr_lower = format!("0x{}", hex::encode(addr.as_bytes()));
    Ok((s.to_string(), addr_lower))
}

/// Parse `score`: must be a non-negative JSON integer.
/// `serde_json::Number::as_u64` already rejects negatives and floats with a
/// fractional part, which is exactly the distinction wanted here.
fn parse_score(value: &serde_json::Value) -> Result<u64, ApiError> {
    value
        .as_u64()
        .ok_or_else(|| ApiError::BadInput("score must be a non-negative integer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_wallet_rejects_non_string() {
        assert!(parse_wallet(&json!(12345)).is_err());
    }

    #[test]
    fn parse_wallet_rejects_malformed_address() {
        assert!(parse_wallet(&json!("not-an-address")).is_err());
    }

    #[test]
    fn parse_wallet_lowercases_canonical_form() {
        let (original, lower) = parse_wallet(&json!("0xAbCdEf0123456789aBcDEF0123456789abcdef01")).unwrap();
        assert_eq!(original, "0xAbCdEf0123456789aBcDEF0123456789abcdef01");
        assert_eq!(lower, "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn parse_score_rejects_negative_and_float() {
        assert!(parse_score(&json!(-1)).is_err());
        assert!(parse_score(&json!(1.5)).is_err());
        assert!(parse_score(&json!("50")).is_err());
    }

    #[test]
    fn parse_score_accepts_zero_and_non_negative_integers() {
        assert_eq!(parse_score(&json!(0)).unwrap(), 0);
        assert_eq!(parse_score(&json!(50)).unwrap(), 50);
    }
}
