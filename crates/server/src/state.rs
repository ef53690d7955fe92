//! Shared application state

use std::sync::Arc;

use voicelink_config::Settings;
use voicelink_core::{
    AudioSpec, ResponseGenerator, SpeechRecognizer, SpeechSynthesizer, TurnLogger,
};
use voicelink_pipeline::{InferenceGate, TurnConfig, TurnPipeline};
use voicelink_transport::FrameCodec;

use crate::session::SessionRegistry;

/// External collaborators behind their narrow interfaces
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub turn_logger: Arc<dyn TurnLogger>,
}

/// Everything a connection task needs, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub collaborators: Collaborators,
    pub pipeline: Arc<TurnPipeline>,
    pub gate: InferenceGate,
    pub registry: Arc<SessionRegistry>,
    pub codec: FrameCodec,
    pub audio_spec: AudioSpec,
}

impl AppState {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        let gate = InferenceGate::new(settings.speech.max_concurrent_inferences);

        let pipeline = Arc::new(TurnPipeline::new(
            collaborators.recognizer.clone(),
            collaborators.generator.clone(),
            collaborators.synthesizer.clone(),
            gate.clone(),
            TurnConfig {
                max_attempts: settings.generation.max_attempts,
                retry_backoff: settings.generation.retry_backoff(),
                fallback_reply: settings.generation.fallback_reply.clone(),
            },
        ));

        let codec = FrameCodec::new(
            settings.protocol.max_frame_bytes,
            settings.protocol.send_chunk_bytes,
        );

        let audio_spec = AudioSpec {
            sample_rate: settings.audio.sample_rate,
            channels: settings.audio.channels,
            sample_width: settings.audio.sample_width,
        };

        let registry = Arc::new(SessionRegistry::new(settings.server.max_sessions));

        Self {
            settings,
            collaborators,
            pipeline,
            gate,
            registry,
            codec,
            audio_spec,
        }
    }
}
