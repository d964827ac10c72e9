use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioCapture, AudioPlayback};
use crate::protocol::codec::Codec;
use crate::protocol::models::{
    MaxTokens, Modality, SessionConfig, Temperature, ToolChoice, ToolSpec, TurnDetection, Voice,
};
use crate::transport::ws::{self, WsChannel};
use crate::{Error, Result};

use super::observer::{EventHandlers, SessionObserver};
use super::outcome::SessionReport;
use super::supervisor::SessionSupervisor;
use super::uplink::DEFAULT_PACING;

pub struct SpeechSession;

impl SpeechSession {
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }
}

pub struct SessionBuilder {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    config: SessionConfig,
    codec: Codec,
    pacing: Duration,
    observer: Option<Box<dyn SessionObserver>>,
    shutdown: Option<CancellationToken>,
    event_id: Option<String>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: None,
            model: None,
            endpoint: None,
            config: SessionConfig::default(),
            codec: Codec::new(),
            pacing: DEFAULT_PACING,
            observer: None,
            shutdown: None,
            event_id: None,
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the realtime endpoint URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replace the whole session config.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn voice(mut self, voice: Voice) -> Self {
        self.config.voice = voice;
        self
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn modalities(mut self, modalities: impl IntoIterator<Item = Modality>) -> Self {
        self.config.modalities = modalities.into_iter().collect();
        self
    }

    #[must_use]
    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.config.tools.push(tool);
        self
    }

    #[must_use]
    pub const fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.config.tool_choice = choice;
        self
    }

    /// `None` disables server-side turn detection.
    #[must_use]
    pub const fn turn_detection(mut self, turn_detection: Option<TurnDetection>) -> Self {
        self.config.turn_detection = turn_detection;
        self
    }

    #[must_use]
    pub fn transcription_model(mut self, model: Option<String>) -> Self {
        self.config.transcription_model = model;
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temperature: Temperature) -> Self {
        self.config.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn max_response_tokens(mut self, max: MaxTokens) -> Self {
        self.config.max_response_tokens = max;
        self
    }

    #[must_use]
    pub const fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub const fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    #[must_use]
    pub fn handlers(self, handlers: EventHandlers) -> Self {
        self.observer(handlers)
    }

    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Client `event_id` attached to the `session.update`.
    #[must_use]
    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Validate the configuration and produce a supervisor ready to run over
    /// any channel.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the session config is invalid.
    #[allow(clippy::result_large_err)]
    pub fn supervisor(self) -> Result<SessionSupervisor> {
        self.into_parts().map(|(_, supervisor)| supervisor)
    }

    #[allow(clippy::result_large_err)]
    fn into_parts(self) -> Result<(ConnectParams, SessionSupervisor)> {
        self.config.validate()?;

        let mut supervisor = SessionSupervisor::new(self.config)
            .with_codec(self.codec)
            .with_pacing(self.pacing);
        if let Some(observer) = self.observer {
            supervisor = supervisor.with_boxed_observer(observer);
        }
        if let Some(token) = self.shutdown {
            supervisor = supervisor.with_shutdown(token);
        }
        if let Some(event_id) = self.event_id {
            supervisor = supervisor.with_update_event_id(event_id);
        }

        let params = ConnectParams {
            api_key: self.api_key,
            model: self.model,
            endpoint: self.endpoint,
        };
        Ok((params, supervisor))
    }

    /// Connect over WebSocket and run the session with the given devices.
    ///
    /// The devices are closed on every exit path, including failures before
    /// the session starts. Cancelling the shutdown token while connecting
    /// returns `Error::Interrupted`.
    ///
    /// # Errors
    /// Returns an error if configuration is incomplete, the connection fails,
    /// or negotiation fails.
    pub async fn run_ws(
        self,
        mut capture: Box<dyn AudioCapture>,
        mut playback: Box<dyn AudioPlayback>,
    ) -> Result<SessionReport> {
        match self.connect_ws().await {
            Ok((channel, supervisor)) => supervisor.run(Box::new(channel), capture, playback).await,
            Err(err) => {
                if matches!(err, Error::Interrupted) {
                    tracing::info!("Interrupted while connecting");
                } else {
                    tracing::error!("Session not started: {err}");
                }
                capture.close().await;
                playback.close().await;
                Err(err)
            }
        }
    }

    async fn connect_ws(self) -> Result<(WsChannel, SessionSupervisor)> {
        let shutdown = self.shutdown.clone().unwrap_or_default();
        let (params, supervisor) = self.into_parts()?;
        let api_key = params
            .api_key
            .ok_or_else(|| Error::InvalidConfig("api_key required".to_string()))?;
        let channel = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(Error::Interrupted),
            channel = ws::connect(&api_key, params.endpoint.as_deref(), params.model.as_deref()) => channel?,
        };
        Ok((channel, supervisor))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ConnectParams {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_session_options() {
        let supervisor = SpeechSession::builder()
            .voice(Voice::Coral)
            .instructions("Answer briefly.")
            .turn_detection(None)
            .supervisor()
            .unwrap();
        let config = supervisor.config();
        assert_eq!(config.voice, Voice::Coral);
        assert_eq!(config.instructions.as_deref(), Some("Answer briefly."));
        assert!(config.turn_detection.is_none());
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let result = SpeechSession::builder().modalities([Modality::Audio, Modality::Audio]).supervisor();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    async fn run_ws_with(builder: SessionBuilder) -> (Error, usize, usize) {
        let (capture, feed) = crate::audio::memory::capture(1);
        let (playback, probe) = crate::audio::memory::playback();
        let err = builder.run_ws(Box::new(capture), Box::new(playback)).await.unwrap_err();
        (err, feed.close_count(), probe.close_count())
    }

    #[tokio::test]
    async fn run_ws_requires_api_key() {
        let (err, capture_closes, playback_closes) = run_ws_with(SpeechSession::builder()).await;
        assert!(err.to_string().contains("api_key required"));
        assert_eq!((capture_closes, playback_closes), (1, 1));
    }

    #[tokio::test]
    async fn invalid_config_releases_devices() {
        let builder = SpeechSession::builder().api_key("sk-test").modalities([Modality::Text, Modality::Text]);
        let (err, capture_closes, playback_closes) = run_ws_with(builder).await;
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!((capture_closes, playback_closes), (1, 1));
    }

    #[tokio::test]
    async fn failed_connect_releases_devices() {
        let builder = SpeechSession::builder().api_key("sk-test").endpoint("ws://127.0.0.1:1");
        let (err, capture_closes, playback_closes) = run_ws_with(builder).await;
        assert!(matches!(err, Error::WebSocket(_)), "unexpected error: {err}");
        assert_eq!((capture_closes, playback_closes), (1, 1));
    }

    #[tokio::test]
    async fn shutdown_while_connecting_is_interrupted() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let builder = SpeechSession::builder().api_key("sk-test").endpoint("ws://127.0.0.1:1").shutdown(shutdown);
        let (err, capture_closes, playback_closes) = run_ws_with(builder).await;
        assert!(matches!(err, Error::Interrupted));
        assert_eq!((capture_closes, playback_closes), (1, 1));
    }
}
