use serde::{Deserialize, Serialize};

use super::{
    AudioFormat, InputAudioTranscription, MaxTokens, Modality, Temperature, ToolChoice, ToolSpec,
    TurnDetection, Voice,
};

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Negotiation parameters sent once in `session.update`. Never mutated after
/// the first message goes out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default)]
    pub input_audio_format: AudioFormat,
    #[serde(default)]
    pub output_audio_format: AudioFormat,
    #[serde(
        rename = "input_audio_transcription",
        default,
        with = "transcription_model",
        skip_serializing_if = "Option::is_none"
    )]
    pub transcription_model: Option<String>,
    /// `None` is serialized as `null`, which disables turn detection.
    #[serde(default)]
    pub turn_detection: Option<TurnDetection>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default)]
    pub temperature: Temperature,
    #[serde(rename = "max_response_output_tokens", default)]
    pub max_response_tokens: MaxTokens,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modalities: vec![Modality::Text, Modality::Audio],
            instructions: None,
            voice: Voice::default(),
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            turn_detection: Some(TurnDetection::default()),
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            temperature: Temperature::default(),
            max_response_tokens: MaxTokens::default(),
        }
    }
}

impl SessionConfig {
    /// # Errors
    /// Returns an error if modalities are empty or repeated, an audio format is
    /// not PCM16, the VAD parameters are out of range, or a tool is invalid.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> crate::Result<()> {
        if self.modalities.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "at least one modality is required".to_string(),
            ));
        }
        for (idx, modality) in self.modalities.iter().enumerate() {
            if self.modalities[..idx].contains(modality) {
                return Err(crate::Error::InvalidConfig(format!(
                    "modality {modality:?} listed more than once"
                )));
            }
        }
        self.input_audio_format.validate()?;
        self.output_audio_format.validate()?;
        if let Some(turn_detection) = &self.turn_detection {
            turn_detection.validate()?;
        }
        for tool in &self.tools {
            tool.validate()?;
        }
        Ok(())
    }
}

/// Maps `transcription_model: Option<String>` to the wire object
/// `input_audio_transcription: {"model": ...}`.
mod transcription_model {
    use super::InputAudioTranscription;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(model: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        model
            .as_ref()
            .map(|model| InputAudioTranscription { model: model.clone() })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<InputAudioTranscription>::deserialize(deserializer)?.map(|t| t.model))
    }
}
