use serde::{Deserialize, Serialize};

/// Audio encoding negotiated for either direction of the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Pcm16,
    G711Ulaw,
    G711Alaw,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pcm16 => write!(f, "pcm16"),
            Self::G711Ulaw => write!(f, "g711_ulaw"),
            Self::G711Alaw => write!(f, "g711_alaw"),
        }
    }
}

impl AudioFormat {
    /// The client only frames raw PCM, so both directions must be `pcm16`.
    ///
    /// # Errors
    /// Returns an error for any companded format.
    #[allow(clippy::result_large_err)]
    pub fn validate(self) -> Result<(), crate::error::Error> {
        match self {
            Self::Pcm16 => Ok(()),
            other => Err(crate::error::Error::InvalidConfig(format!(
                "audio format {other} is not supported, only pcm16"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Server-side turn detection. Absent (`null` on the wire) means mode `none`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
        create_response: bool,
    },
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
            create_response: true,
        }
    }
}

impl TurnDetection {
    /// # Errors
    /// Returns an error if the VAD threshold is outside [0.0, 1.0].
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        match self {
            Self::ServerVad { threshold, .. } if !(0.0..=1.0).contains(threshold) => {
                Err(crate::error::Error::InvalidConfig(format!(
                    "server_vad threshold must be within 0.0..=1.0, got {threshold}"
                )))
            }
            Self::ServerVad { .. } => Ok(()),
        }
    }
}
