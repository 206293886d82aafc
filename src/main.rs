use std::net::SocketAddr;

use sqlx::sqlite::SqlitePoolOptions;
use tieba_api::app_router;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://tieba.db?mode=rwc".to_string());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()
        .expect("BIND_ADDR must be a valid socket address");

    info!("Listening on {addr}");

    axum::Server::bind(&addr)
        .serve(app_router(pool).into_make_service())
        .await
        .expect("Server error");
}
