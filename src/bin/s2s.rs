//! Talk to a realtime speech-to-speech model through the default microphone
//! and speaker. Ctrl+C ends the session cleanly.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use s2s_rt::audio::PcmSpec;
use s2s_rt::audio::cpal_backend::{CpalCapture, CpalPlayback};
use s2s_rt::config::Settings;
use s2s_rt::{EndReason, Error, LogObserver, SpeechSession, Voice};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "s2s", version, about = "Duplex real-time speech session")]
struct Cli {
    /// Voice used for spoken responses
    #[arg(long, default_value_t = Voice::Alloy)]
    voice: Voice,

    /// System instructions sent with the session
    #[arg(long, env = "REALTIME_INSTRUCTIONS")]
    instructions: Option<String>,

    /// Model name; overrides REALTIME_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Delay after each sent audio frame, in milliseconds
    #[arg(long, default_value_t = 10)]
    pacing_ms: u64,

    /// Disable server-side turn detection
    #[arg(long)]
    no_vad: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(api_key = %settings.masked_api_key(), "Configuration loaded");

    let spec = PcmSpec::default();
    let capture = match CpalCapture::open(spec) {
        Ok(capture) => capture,
        Err(err) => {
            tracing::error!("Failed to open microphone: {err}");
            return ExitCode::FAILURE;
        }
    };
    let playback = match CpalPlayback::open(spec) {
        Ok(playback) => playback,
        Err(err) => {
            tracing::error!("Failed to open speaker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, closing session");
            on_signal.cancel();
        }
    });

    let mut builder = SpeechSession::builder()
        .api_key(settings.api_key)
        .voice(cli.voice)
        .pacing(Duration::from_millis(cli.pacing_ms))
        .observer(LogObserver)
        .shutdown(shutdown);
    if let Some(model) = cli.model.or(settings.model) {
        builder = builder.model(model);
    }
    if let Some(endpoint) = settings.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(instructions) = cli.instructions {
        builder = builder.instructions(instructions);
    }
    if cli.no_vad {
        builder = builder.turn_detection(None);
    }

    match builder.run_ws(Box::new(capture), Box::new(playback)).await {
        Ok(report) => match report.reason {
            EndReason::DeviceFault(_) | EndReason::ChannelError(_) | EndReason::RemoteError(_) => ExitCode::FAILURE,
            EndReason::ChannelClosed | EndReason::Terminated(_) | EndReason::Interrupted => ExitCode::SUCCESS,
        },
        Err(Error::Interrupted) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Session failed: {err}");
            ExitCode::FAILURE
        }
    }
}
