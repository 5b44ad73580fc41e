//! services/api/src/bin/api.rs

use api_lib::{
    actions::ActionContext,
    adapters::GeminiClient,
    config::Config,
    error::ApiError,
    web::{router, AppState},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize the Generation Client ---
    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; every generation request will fail until it is configured");
    }
    let client = Arc::new(GeminiClient::new(config.gemini.clone())?);
    info!(
        text_model = %config.gemini.text_model,
        image_model = %config.gemini.image_model,
        speech_model = %config.gemini.speech_model,
        video_model = %config.gemini.video_model,
        "Generation client ready"
    );

    // --- 3. Build the Shared AppState ---
    let actions = ActionContext::new(client, config.poll_policy);
    let app_state = Arc::new(AppState::new(config.clone(), actions));

    // --- 4. Create the Web Router ---
    let app = router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
