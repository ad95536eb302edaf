mod app;
mod auth;
mod config;
mod error;
mod recipes;
mod state;
mod storage;
mod users;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebox=debug,axum=info,tower_http=info".to_string());
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

    let app_state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    bootstrap_superuser(&app_state).await?;

    let app = app::build_app(app_state);
    app::serve(app).await
}

/// Create the admin account from ADMIN_EMAIL/ADMIN_PASSWORD when configured;
/// a no-op once the account exists.
async fn bootstrap_superuser(state: &AppState) -> anyhow::Result<()> {
    let (Ok(email), Ok(password)) = (
        std::env::var("ADMIN_EMAIL"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        return Ok(());
    };

    let email = users::dto::normalize_email(&email);
    if users::repo::User::find_by_email(&state.db, &email)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let hash = auth::password::hash_password(&password)?;
    let user = users::repo::User::create_superuser(&state.db, &email, &hash).await?;
    tracing::info!(user_id = %user.id, email = %user.email, "superuser created");
    Ok(())
}
