//! Wire codec for the session's message vocabulary.
//!
//! Outbound events are validated and serialized to JSON text frames; inbound
//! frames are parsed once here into a closed [`ServerEvent`] so the downlink
//! loop never inspects raw JSON.

use base64::Engine as _;
use base64::engine::general_purpose;

use super::client_events::ClientEvent;
use super::server_events::ServerEvent;
use crate::error::DecodeError;
use crate::{Error, Result};

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";
pub const MAX_INPUT_AUDIO_CHUNK_BYTES: usize = 15 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    max_audio_chunk_bytes: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_audio_chunk_bytes: MAX_INPUT_AUDIO_CHUNK_BYTES,
        }
    }

    #[must_use]
    pub const fn with_max_audio_chunk_bytes(mut self, max: usize) -> Self {
        self.max_audio_chunk_bytes = max;
        self
    }

    /// Validate and serialize an outbound event.
    ///
    /// # Errors
    /// Returns an error if the event fails validation or serialization.
    #[allow(clippy::result_large_err)]
    pub fn encode(&self, event: &ClientEvent) -> Result<String> {
        self.validate(event)?;
        let json = serde_json::to_string(event)?;
        tracing::trace!("Encoded {}: {}", event.event_type(), safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        Ok(json)
    }

    /// Build an `input_audio_buffer.append` event for one PCM frame.
    #[must_use]
    pub fn audio_append(pcm: &[u8]) -> ClientEvent {
        ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio: general_purpose::STANDARD.encode(pcm),
        }
    }

    /// Encode one PCM frame straight to wire text.
    ///
    /// # Errors
    /// Returns an error if the frame exceeds the configured chunk limit.
    #[allow(clippy::result_large_err)]
    pub fn encode_audio(&self, pcm: &[u8]) -> Result<String> {
        self.encode(&Self::audio_append(pcm))
    }

    /// Parse one inbound text frame.
    ///
    /// # Errors
    /// Returns a `DecodeError` for invalid JSON, a missing discriminator, or a
    /// recognized event whose payload has the wrong shape.
    pub fn decode(&self, text: &str) -> std::result::Result<ServerEvent, DecodeError> {
        tracing::trace!("Decoding event: {}", safe_truncate(text, TRACE_LOG_MAX_BYTES));
        let value: serde_json::Value = serde_json::from_str(text)?;
        ServerEvent::from_value(value)
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self, event: &ClientEvent) -> Result<()> {
        match event {
            ClientEvent::InputAudioBufferAppend { audio, .. } => {
                let size = estimate_base64_decoded_len(audio)?;
                if size > self.max_audio_chunk_bytes {
                    return Err(Error::InvalidClientEvent(format!(
                        "input_audio_buffer.append exceeds {} bytes ({size} bytes)",
                        self.max_audio_chunk_bytes
                    )));
                }
            }
            ClientEvent::SessionUpdate { session, .. } => session.validate()?,
        }
        Ok(())
    }
}

/// Reverse the binary-safe encoding of an audio payload.
///
/// # Errors
/// Returns an error if `audio` is not valid standard base64.
pub fn decode_audio(audio: &str) -> std::result::Result<Vec<u8>, DecodeError> {
    Ok(general_purpose::STANDARD.decode(audio.as_bytes())?)
}

pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

#[allow(clippy::result_large_err)]
fn estimate_base64_decoded_len(s: &str) -> Result<usize> {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 length".to_string(),
        ));
    }

    let mut padding = 0;
    let mut seen_padding = false;
    for &b in bytes {
        if b == b'=' {
            seen_padding = true;
            padding += 1;
            continue;
        }
        if seen_padding {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 padding".to_string(),
            ));
        }
        if !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/') {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 character".to_string(),
            ));
        }
    }

    if padding > 2 {
        return Err(Error::InvalidClientEvent(
            "input_audio_buffer.append invalid base64 padding length".to_string(),
        ));
    }

    Ok(bytes.len() / 4 * 3 - padding)
}
