//! Shared harness for integration tests: an in-memory SQLite database, the
//! deterministic payment gateway and the full application router.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, PaginatorTrait, Set, Statement};
use serde_json::{json, Value};
use tavolo_api::{
    auth::{self, AuthVerifier},
    config::AppConfig,
    db,
    entities::{menu_item, order, restaurant, wallet},
    events::{self, EventSender},
    handlers::AppServices,
    payments::MockGateway,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str = "integration_test_secret_key_long_enough_to_pass_validation";

pub struct TestApp {
    pub router: Router,
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub gateway: Arc<MockGateway>,
    cfg: AppConfig,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:",
            TEST_JWT_SECRET,
            "127.0.0.1",
            18_080,
            "test",
        );
        // A single pooled connection keeps every query on the same in-memory
        // database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
        );

        let state = AppState {
            db: db_arc.clone(),
            config: cfg.clone(),
            event_sender,
            services,
        };

        let verifier = Arc::new(AuthVerifier::from_config(&cfg));
        let router = tavolo_api::build_router(state, verifier);

        Self {
            router,
            db: db_arc,
            gateway,
            cfg,
            _event_task: event_task,
        }
    }

    pub fn token_for(&self, user_id: Uuid, email: &str) -> String {
        auth::sign_token(
            user_id,
            email,
            &self.cfg.jwt_secret,
            &self.cfg.jwt_issuer,
            &self.cfg.jwt_audience,
            3600,
        )
        .expect("failed to sign test token")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(json_body) => builder
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json_body).expect("serializable body"),
                ))
                .expect("request build"),
            None => builder.body(Body::empty()).expect("request build"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }

    pub async fn seed_restaurant(&self, delivery_fee: Decimal, payable: bool) -> restaurant::Model {
        restaurant::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Trattoria Prova".to_string()),
            delivery_fee: Set(delivery_fee),
            commission_rate: Set(Decimal::new(500, 2)),
            stripe_account_id: Set(payable.then(|| format!("acct_{}", Uuid::new_v4().simple()))),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed restaurant")
    }

    pub async fn seed_menu_item(
        &self,
        restaurant_id: Uuid,
        name: &str,
        price: Decimal,
    ) -> menu_item::Model {
        menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            name: Set(name.to_string()),
            price: Set(price),
            is_available: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("seed menu item")
    }

    pub async fn seed_wallet(&self, user_id: Uuid, balance: Decimal) {
        wallet::ActiveModel {
            user_id: Set(user_id),
            balance: Set(balance),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed wallet");
    }

    pub async fn wallet_balance(&self, user_id: Uuid) -> Decimal {
        wallet::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .expect("wallet query")
            .map(|row| row.balance)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn orders_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("orders count")
    }

    pub async fn find_order(&self, order_id: Uuid) -> Option<order::Model> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .expect("order query")
    }

    pub async fn execute_sql(&self, sql: &str) {
        self.db
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Sqlite,
                sql.to_string(),
            ))
            .await
            .expect("raw sql");
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Parses a money field that may arrive as "15.79", "15.8" or a bare number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {other:?}"),
    }
}

pub fn delivery_address() -> Value {
    json!({
        "formatted": "1 Via Roma, 10100 Torino",
        "placeId": "place-1",
        "streetAddress": "Via Roma 1",
        "city": "Torino",
        "postalCode": "10100",
        "coordinates": { "lat": 45.07, "lng": 7.69 }
    })
}

pub fn item_payload(menu_item: &menu_item::Model, quantity: i64) -> Value {
    json!({
        "menu_item_id": menu_item.id,
        "name": menu_item.name,
        "quantity": quantity,
        "unit_price": menu_item.price,
    })
}

pub fn order_payload(user_id: Uuid, restaurant_id: Uuid, items: Vec<Value>) -> Value {
    json!({
        "user_id": user_id,
        "restaurant_id": restaurant_id,
        "items": items,
        "delivery_address": delivery_address(),
    })
}
