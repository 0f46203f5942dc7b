pub mod casso;
pub mod common;
pub mod sepay;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/sepay", post(sepay::handle))
        .route("/webhooks/casso", post(casso::handle))
}
