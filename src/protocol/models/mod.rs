pub mod audio;
pub mod common;
pub mod response;
pub mod session;
pub mod tools;

pub use audio::{AudioFormat, InputAudioTranscription, TurnDetection};
pub use common::{
    ArbitraryJson, DEFAULT_MODEL, Infinite, JsonSchema, MaxTokens, Modality, Temperature,
    TemperatureError, Voice,
};
pub use response::{ContentPart, OutputItem, Response};
pub use session::{DEFAULT_TRANSCRIPTION_MODEL, SessionConfig};
pub use tools::{ToolChoice, ToolKind, ToolSpec};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tokens_infinite() {
        let inf = MaxTokens::Infinite(Infinite::Inf);
        let serialized = serde_json::to_string(&inf).unwrap();
        assert_eq!(serialized, "\"inf\"");
        let deserialized: MaxTokens = serde_json::from_str(&serialized).unwrap();
        assert!(matches!(deserialized, MaxTokens::Infinite(Infinite::Inf)));
    }

    #[test]
    fn default_config_matches_wire_shape() {
        let value = serde_json::to_value(SessionConfig::default()).unwrap();
        assert_eq!(value["modalities"], serde_json::json!(["text", "audio"]));
        assert_eq!(value["voice"], "alloy");
        assert_eq!(value["input_audio_format"], "pcm16");
        assert_eq!(value["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(value["turn_detection"]["type"], "server_vad");
        assert_eq!(value["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(value["turn_detection"]["create_response"], true);
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["max_response_output_tokens"], "inf");
        assert!(value.get("instructions").is_none());
    }

    #[test]
    fn disabled_turn_detection_serializes_null() {
        let config = SessionConfig { turn_detection: None, ..SessionConfig::default() };
        let value = serde_json::to_value(&config).unwrap();
        assert!(value["turn_detection"].is_null());
    }

    #[test]
    fn duplicate_modalities_rejected() {
        let config = SessionConfig {
            modalities: vec![Modality::Audio, Modality::Audio],
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn companded_audio_rejected() {
        let config = SessionConfig {
            output_audio_format: AudioFormat::G711Ulaw,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("g711_ulaw"));
    }

    #[test]
    fn voice_parses_case_insensitively() {
        assert_eq!("Shimmer".parse::<Voice>().unwrap(), Voice::Shimmer);
        assert!("robot".parse::<Voice>().is_err());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        assert!(Temperature::new(2.5).is_err());
        assert!((Temperature::new(1.0).unwrap().get() - 1.0).abs() < f32::EPSILON);
    }
}
