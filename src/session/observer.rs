//! Sinks for what the downlink surfaces: transcripts, text, completed
//! responses, tool calls, and how the session ended.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

use super::outcome::EndReason;
use crate::Result;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A function call requested by the model. Surfaced only; never executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// Raw JSON argument string as sent by the service.
    pub arguments: String,
}

impl ToolCall {
    /// Parse the arguments into a typed value.
    ///
    /// # Errors
    /// Returns an error if the arguments are not valid JSON for `T`.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.arguments)?)
    }
}

/// Receives notifications from a running session. Every method has a no-op
/// default so implementors pick what they care about.
#[async_trait::async_trait]
pub trait SessionObserver: Send + Sync {
    async fn on_session_created(&self, _session_id: &str) {}

    async fn on_transcript(&self, _text: &str, _is_final: bool) {}

    async fn on_text(&self, _text: &str) {}

    /// `transcript` is the first content part's transcript, if there is one.
    async fn on_response_done(&self, _response_id: Option<&str>, _transcript: Option<&str>) {}

    async fn on_tool_call(&self, _call: &ToolCall) {}

    async fn on_terminated(&self, _reason: Option<&str>) {}

    async fn on_error(&self, _message: &str) {}

    /// Called once after the session is closed and its resources released.
    async fn on_ended(&self, _reason: &EndReason) {}
}

#[async_trait::async_trait]
impl SessionObserver for () {}

/// Logs transcripts and lifecycle notifications through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

#[async_trait::async_trait]
impl SessionObserver for LogObserver {
    async fn on_session_created(&self, session_id: &str) {
        tracing::info!(session_id, "Session active");
    }

    async fn on_transcript(&self, text: &str, is_final: bool) {
        if is_final {
            tracing::info!("Transcript: {text}");
        } else {
            tracing::debug!("Transcript delta: {text}");
        }
    }

    async fn on_text(&self, text: &str) {
        tracing::info!("Text: {text}");
    }

    async fn on_response_done(&self, response_id: Option<&str>, transcript: Option<&str>) {
        match transcript {
            Some(transcript) => tracing::info!(response_id, "Response done: {transcript}"),
            None => tracing::debug!(response_id, "Response done without transcript"),
        }
    }

    async fn on_tool_call(&self, call: &ToolCall) {
        tracing::info!(call_id = %call.call_id, name = %call.name, "Tool call requested: {}", call.arguments);
    }

    async fn on_terminated(&self, reason: Option<&str>) {
        tracing::info!("Session terminated: {}", reason.unwrap_or("no reason given"));
    }

    async fn on_error(&self, message: &str) {
        tracing::error!("Session error: {message}");
    }

    async fn on_ended(&self, reason: &EndReason) {
        tracing::info!("Session ended: {reason}");
    }
}

/// Owned form of every notification, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { session_id: String },
    Transcript { text: String, is_final: bool },
    Text { text: String },
    ResponseDone { response_id: Option<String>, transcript: Option<String> },
    ToolCall(ToolCall),
    Terminated { reason: Option<String> },
    Error { message: String },
    Ended(EndReason),
}

async fn forward(tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if tx.send(event).await.is_err() {
        tracing::debug!("Session event receiver dropped");
    }
}

#[async_trait::async_trait]
impl SessionObserver for mpsc::Sender<SessionEvent> {
    async fn on_session_created(&self, session_id: &str) {
        forward(self, SessionEvent::Created { session_id: session_id.to_string() }).await;
    }

    async fn on_transcript(&self, text: &str, is_final: bool) {
        forward(self, SessionEvent::Transcript { text: text.to_string(), is_final }).await;
    }

    async fn on_text(&self, text: &str) {
        forward(self, SessionEvent::Text { text: text.to_string() }).await;
    }

    async fn on_response_done(&self, response_id: Option<&str>, transcript: Option<&str>) {
        let event = SessionEvent::ResponseDone {
            response_id: response_id.map(str::to_string),
            transcript: transcript.map(str::to_string),
        };
        forward(self, event).await;
    }

    async fn on_tool_call(&self, call: &ToolCall) {
        forward(self, SessionEvent::ToolCall(call.clone())).await;
    }

    async fn on_terminated(&self, reason: Option<&str>) {
        forward(self, SessionEvent::Terminated { reason: reason.map(str::to_string) }).await;
    }

    async fn on_error(&self, message: &str) {
        forward(self, SessionEvent::Error { message: message.to_string() }).await;
    }

    async fn on_ended(&self, reason: &EndReason) {
        forward(self, SessionEvent::Ended(reason.clone())).await;
    }
}

pub type SessionCreatedHandler = Box<dyn Fn(String) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TranscriptHandler = Box<dyn Fn(String, bool) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TextHandler = Box<dyn Fn(String) -> BoxFuture<Result<()>> + Send + Sync>;
pub type ResponseDoneHandler = Box<dyn Fn(Option<String>) -> BoxFuture<Result<()>> + Send + Sync>;
pub type ToolCallHandler = Box<dyn Fn(ToolCall) -> BoxFuture<Result<()>> + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(String) -> BoxFuture<Result<()>> + Send + Sync>;
pub type TerminatedHandler = Box<dyn Fn(Option<String>) -> BoxFuture<Result<()>> + Send + Sync>;
pub type EndedHandler = Box<dyn Fn(EndReason) -> BoxFuture<Result<()>> + Send + Sync>;

/// Closure-based observer. Handler errors are logged and never end the session.
#[derive(Default)]
pub struct EventHandlers {
    pub on_session_created: Option<SessionCreatedHandler>,
    pub on_transcript: Option<TranscriptHandler>,
    pub on_text: Option<TextHandler>,
    pub on_response_done: Option<ResponseDoneHandler>,
    pub on_tool_call: Option<ToolCallHandler>,
    pub on_error: Option<ErrorHandler>,
    pub on_terminated: Option<TerminatedHandler>,
    pub on_ended: Option<EndedHandler>,
}

impl EventHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_session_created<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_session_created = Some(Box::new(move |session_id| Box::pin(handler(session_id))));
        self
    }

    #[must_use]
    pub fn on_transcript<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String, bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_transcript = Some(Box::new(move |text, is_final| Box::pin(handler(text, is_final))));
        self
    }

    #[must_use]
    pub fn on_text<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_text = Some(Box::new(move |text| Box::pin(handler(text))));
        self
    }

    /// Called with the completed response's transcript, or `None` when it had none.
    #[must_use]
    pub fn on_response_done<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_response_done = Some(Box::new(move |transcript| Box::pin(handler(transcript))));
        self
    }

    #[must_use]
    pub fn on_tool_call<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ToolCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_tool_call = Some(Box::new(move |call| Box::pin(handler(call))));
        self
    }

    #[must_use]
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_error = Some(Box::new(move |message| Box::pin(handler(message))));
        self
    }

    /// Called with the service's reason when it terminates the session.
    #[must_use]
    pub fn on_terminated<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_terminated = Some(Box::new(move |reason| Box::pin(handler(reason))));
        self
    }

    /// Called once with the final reason, after everything is released.
    #[must_use]
    pub fn on_ended<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(EndReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_ended = Some(Box::new(move |reason| Box::pin(handler(reason))));
        self
    }
}

async fn settle(kind: &str, fut: BoxFuture<Result<()>>) {
    if let Err(err) = fut.await {
        tracing::warn!("{kind} handler failed: {err}");
    }
}

#[async_trait::async_trait]
impl SessionObserver for EventHandlers {
    async fn on_session_created(&self, session_id: &str) {
        if let Some(handler) = &self.on_session_created {
            settle("session created", handler(session_id.to_string())).await;
        }
    }

    async fn on_transcript(&self, text: &str, is_final: bool) {
        if let Some(handler) = &self.on_transcript {
            settle("transcript", handler(text.to_string(), is_final)).await;
        }
    }

    async fn on_text(&self, text: &str) {
        if let Some(handler) = &self.on_text {
            settle("text", handler(text.to_string())).await;
        }
    }

    async fn on_response_done(&self, _response_id: Option<&str>, transcript: Option<&str>) {
        if let Some(handler) = &self.on_response_done {
            settle("response", handler(transcript.map(str::to_string))).await;
        }
    }

    async fn on_tool_call(&self, call: &ToolCall) {
        if let Some(handler) = &self.on_tool_call {
            settle("tool call", handler(call.clone())).await;
        }
    }

    async fn on_error(&self, message: &str) {
        if let Some(handler) = &self.on_error {
            settle("error", handler(message.to_string())).await;
        }
    }

    async fn on_terminated(&self, reason: Option<&str>) {
        if let Some(handler) = &self.on_terminated {
            settle("terminated", handler(reason.map(str::to_string))).await;
        }
    }

    async fn on_ended(&self, reason: &EndReason) {
        if let Some(handler) = &self.on_ended {
            settle("ended", handler(reason.clone())).await;
        }
    }
}
