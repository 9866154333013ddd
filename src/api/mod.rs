//! HTTP surface: handlers, session gate and the route table.

pub mod handlers {
    pub use crate::handlers::*;
}

pub mod auth {
    pub use crate::auth::*;
}

use crate::handlers::{self as h, AppState};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Routes under `/api/v1`. Every handler here requires a session user.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/erp/health", get(h::erp_health))
        .route("/api/v1/sale-orders", get(h::list_sale_orders))
        .route("/api/v1/payments/status", get(h::payment_status))
        .route("/api/v1/payments/intents/:id", get(h::payment_intent))
        .route("/api/v1/renewal-collection", get(h::renewal_collection))
        .route(
            "/api/v1/follow-ups",
            get(h::list_follow_ups).post(h::create_follow_up),
        )
        .route(
            "/api/v1/follow-ups/:id",
            get(h::get_follow_up)
                .patch(h::update_follow_up)
                .delete(h::delete_follow_up),
        )
}

/// Full application without rate limiting.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(h::health))
        .merge(routes())
        .with_state(state)
}
