//! Voicelink server entry point

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voicelink_config::{load_settings, Settings};
use voicelink_llm::{LlmConfig, OllamaBackend};
use voicelink_pipeline::{
    HttpSpeechRecognizer, HttpSpeechSynthesizer, SttServiceConfig, TtsServiceConfig,
};
use voicelink_server::{AppState, Collaborators, FileTurnLogger, Listener};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("VOICELINK_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!("Starting voicelink server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_env = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    // Scratch and history directories must exist before the first turn
    std::fs::create_dir_all(&settings.audio.scratch_dir)?;
    std::fs::create_dir_all(&settings.history_dir)?;

    let collaborators = build_collaborators(&settings).await?;

    let state = AppState::new(settings, collaborators);
    let listener = Listener::bind(state).await?;
    listener.serve(shutdown_signal()).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Construct the external collaborator adapters from settings
///
/// Unreachable services are logged but not fatal; adapters retry per
/// request. Only adapter misconfiguration aborts startup.
async fn build_collaborators(settings: &Settings) -> anyhow::Result<Collaborators> {
    let recognizer = HttpSpeechRecognizer::new(SttServiceConfig {
        url: settings.speech.stt_endpoint.clone(),
        timeout: settings.speech.request_timeout(),
        ..Default::default()
    })?;
    if !recognizer.is_available().await {
        tracing::warn!(
            endpoint = %settings.speech.stt_endpoint,
            "Speech service not reachable, will retry on first request"
        );
    }

    let generator = OllamaBackend::new(LlmConfig {
        model: settings.generation.model.clone(),
        endpoint: settings.generation.endpoint.clone(),
        max_tokens: settings.generation.max_tokens,
        temperature: settings.generation.temperature,
        timeout: settings.generation.request_timeout(),
        system_prompt: settings.generation.system_prompt.clone(),
    })?;
    if !generator.is_available().await {
        tracing::warn!(
            endpoint = %settings.generation.endpoint,
            "Generation backend not reachable, will retry on first request"
        );
    }

    let synthesizer = HttpSpeechSynthesizer::new(TtsServiceConfig {
        url: settings.speech.tts_endpoint.clone(),
        timeout: settings.speech.request_timeout(),
        output_spec: voicelink_core::AudioSpec {
            sample_rate: settings.audio.sample_rate,
            channels: settings.audio.channels,
            sample_width: settings.audio.sample_width,
        },
        ..Default::default()
    })?;
    if !synthesizer.is_available().await {
        tracing::warn!(
            endpoint = %settings.speech.tts_endpoint,
            "TTS service not reachable, will retry on first request"
        );
    }

    Ok(Collaborators {
        recognizer: Arc::new(recognizer),
        generator: Arc::new(generator),
        synthesizer: Arc::new(synthesizer),
        turn_logger: Arc::new(FileTurnLogger::new(&settings.history_dir)),
    })
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.observability.log_level.clone().into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
