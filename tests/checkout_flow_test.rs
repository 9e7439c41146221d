mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::{food_line, read_json, TestApp};
use pawhaven_api::payments::SENTINEL_ORDER_MARKER;

#[tokio::test]
async fn order_checkout_brokers_a_session_and_records_it() {
    let app = TestApp::new().await;
    app.gateway
        .set_default_price("prod_dog_food", "price_dog_food", 8_500);
    let order_id = app.seed_order(json!([food_line(8_500, 2)])).await;

    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "order_id": order_id,
                "items": [{ "external_product_id": "prod_dog_food", "quantity": 2 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["order_id"], order_id.to_string());
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();
    assert!(body["data"]["url"].as_str().unwrap().starts_with("https://"));

    // The session metadata is the reconciler's join key.
    let sent = app.gateway.last_session();
    assert_eq!(sent.order_ref, order_id.to_string());
    assert_eq!(sent.user_id, app.customer_id.to_string());
    assert_eq!(sent.lines.len(), 1);
    assert_eq!(sent.lines[0].price_id, "price_dog_food");
    assert_eq!(sent.lines[0].quantity, 2);

    let order = app.fetch_order(order_id).await;
    assert_eq!(order["checkout_session_id"], session_id);
    assert_eq!(order["status"], "pending");
}

#[tokio::test]
async fn explicit_price_id_wins_over_default_price_lookup() {
    let app = TestApp::new().await;
    let order_id = app
        .seed_order(json!([{
            "external_product_id": "prod_spa_day",
            "external_price_id": "price_spa_luxury",
            "name": "Luxury Spa Day",
            "unit_price": 70_000,
            "quantity": 1
        }]))
        .await;

    // No default price is configured; the explicit tier price must be used
    // without any lookup.
    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "order_id": order_id,
                "items": [{
                    "external_product_id": "prod_spa_day",
                    "external_price_id": "price_spa_luxury",
                    "quantity": 1
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sent = app.gateway.last_session();
    assert_eq!(sent.lines[0].price_id, "price_spa_luxury");
}

#[tokio::test]
async fn unpriced_line_fails_the_whole_checkout() {
    let app = TestApp::new().await;
    app.gateway
        .set_default_price("prod_dog_food", "price_dog_food", 8_500);
    let order_id = app
        .seed_order(json!([food_line(8_500, 1), {
            "external_product_id": "prod_unlisted",
            "name": "Unlisted Thing",
            "unit_price": 100,
            "quantity": 1
        }]))
        .await;

    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "order_id": order_id,
                "items": [
                    { "external_product_id": "prod_dog_food", "quantity": 1 },
                    { "external_product_id": "prod_unlisted", "quantity": 1 }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.gateway.sessions().is_empty(), "no session may be created");

    let order = app.fetch_order(order_id).await;
    assert!(order["checkout_session_id"].is_null());
}

#[tokio::test]
async fn single_product_mode_uses_the_sentinel_marker() {
    let app = TestApp::new().await;
    app.gateway
        .set_default_price("prod_treats", "price_treats", 4_500);

    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({ "product_id": "prod_treats" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["data"]["order_id"].is_null());

    let sent = app.gateway.last_session();
    assert_eq!(sent.order_ref, SENTINEL_ORDER_MARKER);
    assert_eq!(sent.lines[0].price_id, "price_treats");
    assert_eq!(sent.lines[0].quantity, 1);
}

#[tokio::test]
async fn single_product_without_default_price_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({ "product_id": "prod_ghost" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.gateway.sessions().is_empty());
}

#[tokio::test]
async fn checkout_for_another_users_order_is_not_found() {
    let app = TestApp::new().await;
    app.gateway
        .set_default_price("prod_dog_food", "price_dog_food", 8_500);
    let order_id = app.seed_order(json!([food_line(8_500, 1)])).await;

    let other_token = app.token_for(Uuid::new_v4(), "stranger@example.com");
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "order_id": order_id,
                "items": [{ "external_product_id": "prod_dog_food", "quantity": 1 }]
            })),
            Some(&other_token),
        )
        .await;

    // Ownership failures read as not-found, leaking nothing.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.gateway.sessions().is_empty());
}

#[tokio::test]
async fn checkout_for_a_missing_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .authed(
            Method::POST,
            "/api/v1/checkout/session",
            Some(json!({
                "order_id": Uuid::new_v4(),
                "items": [{ "external_product_id": "prod_dog_food", "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
