use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use gasbank_core::{EnsureAccountOptions, WithdrawOptions};
use gasbank_types::{AccountId, Amount, ErrorKind, GasBankError, OwnerId, TxStatus, TxType};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Map the closed error taxonomy onto HTTP status codes.
fn error_response(err: GasBankError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::WalletConflict => StatusCode::CONFLICT,
        ErrorKind::Policy => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Concurrency => StatusCode::CONFLICT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": err.to_string()})))
}

fn ok_json<T: Serialize>(value: T) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(value) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

fn parse_amount(value: &str) -> Result<Amount, GasBankError> {
    Amount::from_string(value)
}

fn parse_optional_amount(value: &Option<String>) -> Result<Option<Amount>, GasBankError> {
    value.as_deref().map(Amount::from_string).transpose()
}

#[derive(Deserialize)]
pub struct EnsureAccountRequest {
    pub owner_id: String,
    pub wallet_address: String,
    pub min_balance: Option<String>,
    pub daily_limit: Option<String>,
    pub notification_threshold: Option<String>,
    pub required_approvals: Option<u32>,
}

/// Ensure a gas account exists for (owner, wallet)
pub async fn ensure_account(
    State(state): State<AppState>,
    Json(req): Json<EnsureAccountRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let min_balance = match parse_optional_amount(&req.min_balance) {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    let daily_limit = match parse_optional_amount(&req.daily_limit) {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    let notification_threshold = match parse_optional_amount(&req.notification_threshold) {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    let opts = EnsureAccountOptions {
        wallet_address: None,
        min_balance,
        daily_limit,
        notification_threshold,
        required_approvals: req.required_approvals,
    };

    let owner = OwnerId::new(req.owner_id);
    match state
        .service
        .ensure_account_with_options(&owner, &req.wallet_address, opts)
    {
        Ok(account) => ok_json(account),
        Err(e) => error_response(e),
    }
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.get_account(&AccountId::new(account_id)) {
        Ok(account) => ok_json(account),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.list_accounts(&OwnerId::new(query.owner_id)) {
        Ok(accounts) => ok_json(accounts),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub external_ref: String,
    pub from_address: String,
    pub to_address: String,
}

#[derive(Serialize)]
struct MutationResponse<A: Serialize, T: Serialize> {
    account: A,
    transaction: T,
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let amount = match parse_amount(&req.amount) {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    match state.service.deposit(
        &AccountId::new(account_id),
        amount,
        &req.external_ref,
        &req.from_address,
        &req.to_address,
    ) {
        Ok((account, transaction)) => ok_json(MutationResponse {
            account,
            transaction,
        }),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub owner_id: String,
    pub amount: String,
    pub to_address: String,
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(req): Json<WithdrawRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let amount = match parse_amount(&req.amount) {
        Ok(amount) => amount,
        Err(e) => return error_response(e),
    };
    match state.service.withdraw_with_options(
        &OwnerId::new(req.owner_id),
        &AccountId::new(account_id),
        WithdrawOptions {
            amount,
            to_address: req.to_address,
            schedule_at: req.schedule_at,
            cron_expression: req.cron_expression,
        },
    ) {
        Ok((account, transaction)) => ok_json(MutationResponse {
            account,
            transaction,
        }),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub success: bool,
    pub failure_reason: Option<String>,
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.complete_withdrawal(
        &transaction_id,
        req.success,
        req.failure_reason.as_deref().unwrap_or(""),
    ) {
        Ok((account, transaction)) => ok_json(MutationResponse {
            account,
            transaction,
        }),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub owner_id: String,
    pub reason: Option<String>,
}

pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.cancel_withdrawal(
        &OwnerId::new(req.owner_id),
        &transaction_id,
        req.reason.as_deref().unwrap_or("cancelled by owner"),
    ) {
        Ok((account, transaction)) => ok_json(MutationResponse {
            account,
            transaction,
        }),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ApprovalRequest {
    pub approver: String,
    pub signature: Option<String>,
    pub note: Option<String>,
    pub approved: bool,
}

pub async fn submit_approval(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.submit_approval(
        &transaction_id,
        &req.approver,
        req.signature,
        req.note,
        req.approved,
    ) {
        Ok((account, transaction)) => ok_json(MutationResponse {
            account,
            transaction,
        }),
        Err(e) => error_response(e),
    }
}

pub async fn list_approvals(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.list_approvals(&transaction_id) {
        Ok(approvals) => ok_json(approvals),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ListTransactionsQuery {
    #[serde(rename = "type")]
    pub tx_type: Option<TxType>,
    pub status: Option<TxStatus>,
    #[serde(default)]
    pub limit: usize,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.list_transactions_filtered(
        &AccountId::new(account_id),
        query.tx_type,
        query.status,
        query.limit,
    ) {
        Ok(txs) => ok_json(txs),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub limit: usize,
}

pub async fn activate_schedules(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.activate_due_schedules(req.limit) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"activated": true}))),
        Err(e) => error_response(e),
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.service.summary(&OwnerId::new(query.owner_id)) {
        Ok(summary) => ok_json(summary),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct DeadLetterQuery {
    pub owner_id: String,
    #[serde(default)]
    pub limit: usize,
}

pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLetterQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .service
        .list_dead_letters(&OwnerId::new(query.owner_id), query.limit)
    {
        Ok(entries) => ok_json(entries),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct DeadLetterActionRequest {
    pub owner_id: String,
}

pub async fn retry_dead_letter(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(req): Json<DeadLetterActionRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .service
        .retry_dead_letter(&OwnerId::new(req.owner_id), &transaction_id)
    {
        Ok(tx) => ok_json(tx),
        Err(e) => error_response(e),
    }
}

pub async fn delete_dead_letter(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .service
        .delete_dead_letter(&OwnerId::new(query.owner_id), &transaction_id)
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"deleted": true}))),
        Err(e) => error_response(e),
    }
}
