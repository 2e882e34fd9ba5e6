//! Common test utilities
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use loyalty_ledger::db;
use loyalty_ledger::store::PgStore;
use loyalty_ledger::OrderNumber;
use rand::Rng;

/// Setup test database - apply schema.
///
/// Tests share the database, so each one works on its own logins and
/// order numbers (see [`unique_login`] and [`unique_number`]).
pub async fn setup_test_db() -> Arc<PgStore> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = db::connect(&database_url, 5, 1)
        .await
        .expect("Failed to connect to DB");
    db::ensure_schema(&pool).await.expect("Failed to apply schema");

    Arc::new(PgStore::new(pool))
}

pub fn unique_login(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Random 18-digit order number
pub fn unique_number() -> OrderNumber {
    let n: u64 = rand::thread_rng().gen_range(100_000_000_000_000_000..999_999_999_999_999_999);
    OrderNumber::parse(&n.to_string()).expect("digits only")
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr: SocketAddr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{}", addr)
}
