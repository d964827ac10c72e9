use base64::Engine as _;
use base64::engine::general_purpose;
use serde::Deserialize;
use serde_json::Value;

use super::models::{ArbitraryJson, ContentPart, Response};
use crate::error::{DecodeError, ServerError};

/// Inbound event vocabulary. Exactly one variant per received message; the
/// wire `type` discriminator selects it and anything unrecognized lands in
/// `Unknown` so newer server events never break the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionCreated {
        session_id: String,
    },
    SessionError {
        message: String,
        code: Option<String>,
    },
    AudioDelta {
        pcm: Vec<u8>,
    },
    TranscriptDelta {
        text: String,
        is_final: bool,
    },
    TextDelta {
        text: String,
    },
    ResponseDone {
        response_id: Option<String>,
        output: Vec<ContentPart>,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    SessionTerminated {
        reason: Option<String>,
    },
    Unknown {
        raw: ArbitraryJson,
    },
}

const KNOWN_TYPES: &[&str] = &[
    "session.created",
    "error",
    "response.audio.delta",
    "response.transcript",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "response.text",
    "response.text.delta",
    "response.done",
    "response.function_call_arguments.done",
    "session.terminated",
];

const UNSPECIFIED_ERROR: &str = "unspecified error";

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "session.created")]
    SessionCreated { session: CreatedSession },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<ServerError>,
    },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.transcript")]
    Transcript {
        transcript: String,
        #[serde(default)]
        is_final: bool,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },
    #[serde(rename = "response.text")]
    Text { text: String },
    #[serde(rename = "response.text.delta")]
    TextDeltaAlias { delta: String },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<Response>,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        #[serde(default)]
        name: String,
        arguments: String,
    },
    #[serde(rename = "session.terminated")]
    SessionTerminated {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl TryFrom<ServerEventRepr> for ServerEvent {
    type Error = DecodeError;

    fn try_from(repr: ServerEventRepr) -> Result<Self, Self::Error> {
        let event = match repr {
            ServerEventRepr::SessionCreated { session } => Self::SessionCreated { session_id: session.id },
            ServerEventRepr::Error { message, error } => {
                let code = error.as_ref().and_then(|e| e.code.clone());
                let message = message
                    .filter(|m| !m.is_empty())
                    .or_else(|| error.map(|e| e.message).filter(|m| !m.is_empty()))
                    .unwrap_or_else(|| UNSPECIFIED_ERROR.to_string());
                Self::SessionError { message, code }
            }
            ServerEventRepr::AudioDelta { delta } => Self::AudioDelta {
                pcm: general_purpose::STANDARD.decode(delta.as_bytes())?,
            },
            ServerEventRepr::Transcript { transcript, is_final } => Self::TranscriptDelta { text: transcript, is_final },
            ServerEventRepr::AudioTranscriptDelta { delta } => Self::TranscriptDelta { text: delta, is_final: false },
            ServerEventRepr::AudioTranscriptDone { transcript } => Self::TranscriptDelta { text: transcript, is_final: true },
            ServerEventRepr::Text { text } => Self::TextDelta { text },
            ServerEventRepr::TextDeltaAlias { delta } => Self::TextDelta { text: delta },
            ServerEventRepr::ResponseDone { response } => {
                let response = response.unwrap_or_default();
                Self::ResponseDone {
                    response_id: response.id.clone(),
                    output: response.into_content_parts(),
                }
            }
            ServerEventRepr::FunctionCallArgumentsDone { call_id, name, arguments } => Self::ToolCall { call_id, name, arguments },
            ServerEventRepr::SessionTerminated { reason } => Self::SessionTerminated { reason },
        };
        Ok(event)
    }
}

impl ServerEvent {
    /// Classify one parsed JSON message.
    ///
    /// # Errors
    /// Returns a `DecodeError` if the message has no string `type`, or if a
    /// recognized type carries a payload of the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?
            .to_string();

        if !KNOWN_TYPES.contains(&event_type.as_str()) {
            return Ok(Self::Unknown { raw: value });
        }

        let repr = ServerEventRepr::deserialize(value).map_err(|err| DecodeError::Malformed {
            event_type: event_type.clone(),
            reason: err.to_string(),
        })?;
        repr.try_into()
    }

    /// The wire discriminator this event was decoded from.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionError { .. } => "error",
            Self::AudioDelta { .. } => "response.audio.delta",
            Self::TranscriptDelta { .. } => "response.transcript",
            Self::TextDelta { .. } => "response.text",
            Self::ResponseDone { .. } => "response.done",
            Self::ToolCall { .. } => "response.function_call_arguments.done",
            Self::SessionTerminated { .. } => "session.terminated",
            Self::Unknown { raw } => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Terminal events end the downlink loop once observed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionError { .. } | Self::SessionTerminated { .. })
    }
}

/// Transcript of the first content part of a completed response, if any.
#[must_use]
pub fn completed_transcript(output: &[ContentPart]) -> Option<&str> {
    output.first().and_then(|part| part.transcript.as_deref())
}
