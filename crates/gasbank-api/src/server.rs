use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the API application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Accounts
        .route("/v1/gas/accounts", post(handlers::ensure_account))
        .route("/v1/gas/accounts", get(handlers::list_accounts))
        .route("/v1/gas/accounts/:account_id", get(handlers::get_account))
        .route("/v1/gas/accounts/:account_id/deposit", post(handlers::deposit))
        .route("/v1/gas/accounts/:account_id/withdraw", post(handlers::withdraw))
        .route(
            "/v1/gas/accounts/:account_id/transactions",
            get(handlers::list_transactions),
        )

        // Withdrawal lifecycle
        .route(
            "/v1/gas/transactions/:transaction_id/complete",
            post(handlers::complete_withdrawal),
        )
        .route(
            "/v1/gas/transactions/:transaction_id/cancel",
            post(handlers::cancel_withdrawal),
        )
        .route(
            "/v1/gas/transactions/:transaction_id/approvals",
            post(handlers::submit_approval),
        )
        .route(
            "/v1/gas/transactions/:transaction_id/approvals",
            get(handlers::list_approvals),
        )

        // Scheduling and aggregates
        .route("/v1/gas/schedules/activate", post(handlers::activate_schedules))
        .route("/v1/gas/summary", get(handlers::summary))

        // Dead letters
        .route("/v1/gas/dead-letters", get(handlers::list_dead_letters))
        .route(
            "/v1/gas/dead-letters/:transaction_id/retry",
            post(handlers::retry_dead_letter),
        )
        .route(
            "/v1/gas/dead-letters/:transaction_id",
            delete(handlers::delete_dead_letter),
        )

        .layer(CorsLayer::permissive())
        .with_state(state)
}
