use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ontime::config::AppConfig;
use ontime::db;
use ontime::services::sms::smsir::SmsIrProvider;
use ontime::services::sms::{LogSmsProvider, SmsProvider};
use ontime::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let sms: Box<dyn SmsProvider> = if config.sms_api_key.is_empty() {
        tracing::warn!("SMS_API_KEY not set, messages will only be logged");
        Box::new(LogSmsProvider)
    } else {
        anyhow::ensure!(
            !config.sms_line_number.is_empty(),
            "SMS_LINE_NUMBER must be set when SMS_API_KEY is"
        );
        tracing::info!("using sms.ir provider (url: {})", config.sms_api_url);
        Box::new(SmsIrProvider::new(
            config.sms_api_url.clone(),
            config.sms_api_key.clone(),
            config.sms_line_number.clone(),
        ))
    };

    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is the default value, set it before going live");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(conn, config, sms));
    let app = ontime::router(state);

    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
