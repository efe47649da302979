//! End-to-end checkout flow tests: authentication, authorization, input
//! validation, pricing, atomic persistence and wallet handling.

mod common;

use axum::http::Method;
use common::{item_payload, money, order_payload, response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn happy_path_prices_persists_and_opens_payment() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let payload = order_payload(user, restaurant.id, vec![item_payload(&pizza, 2)]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    let data = &body["data"];

    assert_eq!(money(&data["subtotal"]), dec!(15.00));
    assert_eq!(money(&data["delivery_fee"]), dec!(0.49));
    assert_eq!(money(&data["service_fee"]), dec!(0.30));
    assert_eq!(money(&data["wallet_credit_used"]), Decimal::ZERO);
    assert_eq!(money(&data["total"]), dec!(15.79));
    assert_eq!(money(&data["cashback_amount"]), dec!(1.50));
    assert_eq!(data["status"], "pending");
    assert_eq!(data["payment_status"], "pending");
    assert!(data["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert!(data["client_secret"].as_str().unwrap().contains("secret"));
    assert!(data["payment_intent_id"].as_str().is_some());
    assert!(data["estimated_delivery_at"].as_str().is_some());

    // The intent reference is attached to the persisted row.
    let order_id = Uuid::parse_str(data["id"].as_str().unwrap()).unwrap();
    let stored = app.find_order(order_id).await.expect("order persisted");
    assert_eq!(
        stored.payment_intent_id.as_deref(),
        data["payment_intent_id"].as_str()
    );
    assert_eq!(app.gateway.created_intent_count(), 1);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let payload = order_payload(user, restaurant.id, vec![item_payload(&pizza, 1)]);

    let response = app
        .request(Method::POST, "/api/v1/orders", None, Some(payload), &[])
        .await;

    assert_eq!(response.status(), 401);
    assert_eq!(app.orders_count().await, 0);
}

#[tokio::test]
async fn claiming_another_users_identity_is_rejected_before_persistence() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let attacker = Uuid::new_v4();
    let victim = Uuid::new_v4();
    let token = app.token_for(attacker, "attacker@example.test");
    // Body claims the victim's id; the token belongs to the attacker.
    let payload = order_payload(victim, restaurant.id, vec![item_payload(&pizza, 1)]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("User mismatch"));
    assert_eq!(app.orders_count().await, 0);
    assert_eq!(app.gateway.created_intent_count(), 0);
}

#[tokio::test]
async fn caller_prices_are_checked_against_the_menu() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(15.00)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    // A 15.00 item submitted at 1.00.
    let mut item = item_payload(&pizza, 1);
    item["unit_price"] = json!("1.00");
    let payload = order_payload(user, restaurant.id, vec![item]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Price mismatch"));
    assert_eq!(app.orders_count().await, 0);
}

#[tokio::test]
async fn negative_unit_price_is_rejected() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let mut item = item_payload(&pizza, 1);
    item["unit_price"] = json!("-50.00");
    let payload = order_payload(user, restaurant.id, vec![item]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(app.orders_count().await, 0);
}

#[tokio::test]
async fn negative_quantity_is_rejected() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let mut item = item_payload(&pizza, 1);
    item["quantity"] = json!(-10);
    let payload = order_payload(user, restaurant.id, vec![item]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(app.orders_count().await, 0);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let payload = order_payload(user, restaurant.id, vec![]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn restaurant_without_payment_account_cannot_take_orders() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), false).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let payload = order_payload(user, restaurant.id, vec![item_payload(&pizza, 1)]);

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;

    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("cannot accept card payments"));
    assert_eq!(app.orders_count().await, 0);
}

#[tokio::test]
async fn wallet_credit_is_clamped_and_debited_atomically() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(2.00), true).await;
    let feast = app.seed_menu_item(restaurant.id, "Degustazione", dec!(43.00)).await;

    let user = Uuid::new_v4();
    app.seed_wallet(user, dec!(5.00)).await;
    let token = app.token_for(user, "diner@example.test");

    let mut payload = order_payload(user, restaurant.id, vec![item_payload(&feast, 1)]);
    // Claim ten times the real balance.
    payload["wallet_amount_to_apply"] = json!("50.00");

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;
    assert_eq!(response.status(), 201);

    let body = response_json(response).await;
    let data = &body["data"];
    // Applied credit is the real balance, not the claim.
    assert_eq!(money(&data["wallet_credit_used"]), dec!(5.00));
    // subtotal 43.00 + delivery 2.00 + service 0.86 - credit 5.00
    assert_eq!(money(&data["total"]), dec!(40.86));

    // The wallet row was debited in the same transaction.
    assert_eq!(app.wallet_balance(user).await, Decimal::ZERO);
}

#[tokio::test]
async fn order_header_and_lines_commit_atomically() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    let payload = order_payload(user, restaurant.id, vec![item_payload(&pizza, 2)]);

    // Force the line insert to fail after the header insert succeeds.
    app.execute_sql("DROP TABLE order_items;").await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
        .await;
    assert_eq!(response.status(), 500);

    // The header insert must have been rolled back with it.
    assert_eq!(app.orders_count().await, 0);
    assert_eq!(app.gateway.created_intent_count(), 0);
}

#[tokio::test]
async fn orders_are_only_visible_to_their_owner() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let owner = Uuid::new_v4();
    let owner_token = app.token_for(owner, "owner@example.test");
    let payload = order_payload(owner, restaurant.id, vec![item_payload(&pizza, 1)]);

    let created = app
        .request(Method::POST, "/api/v1/orders", Some(&owner_token), Some(payload), &[])
        .await;
    assert_eq!(created.status(), 201);
    let created_body = response_json(created).await;
    let order_id = created_body["data"]["id"].as_str().unwrap().to_string();

    // The owner sees the order with its lines.
    let fetched = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(&owner_token),
            None,
            &[],
        )
        .await;
    assert_eq!(fetched.status(), 200);
    let fetched_body = response_json(fetched).await;
    assert_eq!(fetched_body["data"]["items"].as_array().unwrap().len(), 1);

    // Anyone else gets a 404, not somebody else's order.
    let stranger_token = app.token_for(Uuid::new_v4(), "stranger@example.test");
    let denied = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(&stranger_token),
            None,
            &[],
        )
        .await;
    assert_eq!(denied.status(), 404);
}

#[tokio::test]
async fn listing_is_scoped_and_paginated() {
    let app = TestApp::new().await;
    let restaurant = app.seed_restaurant(dec!(0.49), true).await;
    let pizza = app.seed_menu_item(restaurant.id, "Margherita", dec!(7.50)).await;

    let user = Uuid::new_v4();
    let token = app.token_for(user, "diner@example.test");
    for _ in 0..2 {
        let payload = order_payload(user, restaurant.id, vec![item_payload(&pizza, 1)]);
        let response = app
            .request(Method::POST, "/api/v1/orders", Some(&token), Some(payload), &[])
            .await;
        assert_eq!(response.status(), 201);
    }

    let listing = app
        .request(Method::GET, "/api/v1/orders?page=1&limit=10", Some(&token), None, &[])
        .await;
    assert_eq!(listing.status(), 200);
    let body = response_json(listing).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 2);

    let other_token = app.token_for(Uuid::new_v4(), "other@example.test");
    let empty = app
        .request(Method::GET, "/api/v1/orders", Some(&other_token), None, &[])
        .await;
    let empty_body = response_json(empty).await;
    assert_eq!(empty_body["data"]["total"], 0);
}
