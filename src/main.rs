mod actions;
mod app;
mod auth;
mod cache;
mod config;
mod customers;
mod dashboard;
mod error;
mod format;
mod invoices;
mod state;
#[cfg(test)]
mod testing;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "dashboard=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    // Run migrations if present
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    if let Err(e) = migrator.run(&app_state.db).await {
        tracing::warn!(error = %e, "dashboard migrations failed; continuing");
    }
    let mut auth_migrator = sqlx::migrate!("./auth_migrations");
    auth_migrator.set_ignore_missing(true);
    if let Err(e) = auth_migrator.run(&app_state.auth_db).await {
        tracing::warn!(error = %e, "auth migrations failed; continuing");
    }

    app::serve(app::build_app(app_state)).await
}
