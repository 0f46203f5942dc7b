//! Tests for the payment intent endpoints: creation, the pending cap,
//! status polling with lazy expiry, and the public pricing catalogue.

use axum::{body::Body, http::Request};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("response should be valid JSON")
}

fn post_intent(token: &str, plan: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/payments/intents")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::from(json!({ "plan": plan }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_create_intent_returns_code_and_qr() {
    let state = create_test_app_state();
    seed_users(&state);
    let app = test_app(state);

    let response = app.oneshot(post_intent(USER_TOKEN, "pro_monthly")).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["plan"], "pro_monthly");
    assert_eq!(json["amount"], 99_000);
    assert_eq!(json["currency"], "VND");
    assert_eq!(json["status"], "pending");

    let code = json["transfer_code"].as_str().unwrap();
    assert!(code.starts_with("PAYR-"));
    assert_eq!(code.len(), 11);

    let remaining = json["remaining_seconds"].as_i64().unwrap();
    assert!(remaining > 14 * 60 && remaining <= 15 * 60);

    let qr_url = json["qr_payload"]["qr_code_url"].as_str().unwrap();
    assert!(qr_url.starts_with("https://img.vietqr.io/image/"));
    assert!(qr_url.contains("amount=99000"));
    assert!(qr_url.contains(&format!("addInfo={}", code)));
}

#[tokio::test]
async fn test_create_intent_rejects_unknown_plan() {
    let state = create_test_app_state();
    seed_users(&state);
    let app = test_app(state);

    let response = app.oneshot(post_intent(USER_TOKEN, "pro_weekly")).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["details"].as_str().unwrap().contains("pro_weekly"));
}

#[tokio::test]
async fn test_create_intent_requires_auth() {
    let state = create_test_app_state();
    seed_users(&state);
    let app = test_app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/payments/intents")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "plan": "pro_monthly" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_pending_cap_returns_429() {
    let state = create_test_app_state();
    seed_users(&state);
    let app = test_app(state);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(post_intent(USER_TOKEN, "credits_50"))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    }

    let response = app.oneshot(post_intent(USER_TOKEN, "credits_50")).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_lapsed_intents_do_not_count_against_cap() {
    let state = create_test_app_state();
    let (user, _) = seed_users(&state);

    {
        let conn = state.db.get().unwrap();
        for i in 0..5 {
            create_test_intent(
                &conn,
                &user.id,
                PlanCode::Credits50,
                &format!("PAYR-OLD{:03}", i),
                past_timestamp(5),
            );
        }
    }

    let app = test_app(state);
    let response = app.oneshot(post_intent(USER_TOKEN, "credits_50")).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
}

#[tokio::test]
async fn test_get_intent_reports_lazy_expiry_without_writing() {
    let state = create_test_app_state();
    let (user, _) = seed_users(&state);

    let intent = {
        let conn = state.db.get().unwrap();
        create_test_intent(
            &conn,
            &user.id,
            PlanCode::Credits50,
            "PAYR-LAZY01",
            past_timestamp(1),
        )
    };

    let app = test_app(state.clone());
    let request = Request::builder()
        .uri(format!("/payments/intents/{}", intent.id))
        .header("Authorization", format!("Bearer {}", USER_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );

    let json = body_json(response).await;
    assert_eq!(json["status"], "expired");
    assert_eq!(json["remaining_seconds"], 0);

    // The read did not persist the transition.
    let conn = state.db.get().unwrap();
    let stored = queries::get_payment_intent(&conn, &intent.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IntentStatus::Pending);
}

#[tokio::test]
async fn test_get_intent_hides_other_users_intents() {
    let state = create_test_app_state();
    let (_, admin) = seed_users(&state);

    let intent = {
        let conn = state.db.get().unwrap();
        create_test_intent(
            &conn,
            &admin.id,
            PlanCode::Credits50,
            "PAYR-OTHER1",
            future_timestamp(15),
        )
    };

    let app = test_app(state);
    let request = Request::builder()
        .uri(format!("/payments/intents/{}", intent.id))
        .header("Authorization", format!("Bearer {}", USER_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_pending_intent() {
    let state = create_test_app_state();
    let (user, _) = seed_users(&state);

    let intent = {
        let conn = state.db.get().unwrap();
        create_test_intent(
            &conn,
            &user.id,
            PlanCode::Credits50,
            "PAYR-CANCL1",
            future_timestamp(15),
        )
    };

    let app = test_app(state.clone());
    let request = Request::builder()
        .method("POST")
        .uri(format!("/payments/intents/{}/cancel", intent.id))
        .header("Authorization", format!("Bearer {}", USER_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["intent"]["status"], "cancelled");

    let conn = state.db.get().unwrap();
    let stored = queries::get_payment_intent(&conn, &intent.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IntentStatus::Cancelled);
    assert!(stored.cancelled_at.is_some());
}

#[tokio::test]
async fn test_cancel_settled_intent_conflicts() {
    let state = create_test_app_state();
    let (user, _) = seed_users(&state);

    let intent = {
        let conn = state.db.get().unwrap();
        let audit = state.audit.get().unwrap();
        let intent = create_test_intent(
            &conn,
            &user.id,
            PlanCode::Credits50,
            "PAYR-CANCL2",
            future_timestamp(15),
        );
        let tx = bank_tx("sepay_c1", 49_000, "PAYR-CANCL2");
        payrec::reconcile::process_transaction(&conn, &audit, &tx).unwrap();
        intent
    };

    let app = test_app(state.clone());
    let request = Request::builder()
        .method("POST")
        .uri(format!("/payments/intents/{}/cancel", intent.id))
        .header("Authorization", format!("Bearer {}", USER_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);

    // The paid settlement is untouched.
    let conn = state.db.get().unwrap();
    let stored = queries::get_payment_intent(&conn, &intent.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IntentStatus::Paid);
}

#[tokio::test]
async fn test_pricing_is_public() {
    let state = create_test_app_state();
    let app = test_app(state);

    let request = Request::builder()
        .uri("/payments/pricing")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let json = body_json(response).await;
    let pricing = json["pricing"].as_array().unwrap();
    assert_eq!(pricing.len(), 4);
    let yearly = pricing
        .iter()
        .find(|p| p["plan"] == "pro_yearly")
        .unwrap();
    assert_eq!(yearly["amount"], 990_000);
    let credits = pricing
        .iter()
        .find(|p| p["plan"] == "credits_100")
        .unwrap();
    assert_eq!(credits["credits"], 100);
}

#[tokio::test]
async fn test_history_lists_matched_transactions_only() {
    let state = create_test_app_state();
    let (user, _) = seed_users(&state);

    {
        let conn = state.db.get().unwrap();
        let audit = state.audit.get().unwrap();
        create_test_intent(
            &conn,
            &user.id,
            PlanCode::Credits50,
            "PAYR-HIST01",
            future_timestamp(15),
        );
        let paid = bank_tx("sepay_h1", 49_000, "PAYR-HIST01");
        payrec::reconcile::process_transaction(&conn, &audit, &paid).unwrap();
        // Unmatched noise that must not show up.
        let noise = bank_tx("sepay_h2", 10_000, "no code");
        payrec::reconcile::process_transaction(&conn, &audit, &noise).unwrap();
    }

    let app = test_app(state);
    let request = Request::builder()
        .uri("/payments/history?page=1&limit=10")
        .header("Authorization", format!("Bearer {}", USER_TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let json = body_json(response).await;
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["provider_tx_id"], "sepay_h1");
    assert_eq!(transactions[0]["status"], "matched");
}
