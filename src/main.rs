use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use voicebridge::agent::{GeminiResponder, ResponseGenerator};
use voicebridge::api::{self, ApiState};
use voicebridge::db::{self, AgentDirectory, ConversationRepo, ConversationStore};
use voicebridge::session::{IdleKeepAlive, SessionRegistry};
use voicebridge::voice::{DeepgramStt, ElevenLabsTts, SpeechToText, TextToSpeech};
use voicebridge::Config;

/// Voicebridge - real-time voice conversation gateway
#[derive(Parser)]
#[command(name = "voicebridge", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "VOICEBRIDGE_PORT", default_value = "8787")]
    port: u16,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "VOICEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voicebridge=info",
        1 => "info,voicebridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let pool = db::init(config.database_path())?;
    let repo = ConversationRepo::new(pool);
    let store: Arc<dyn ConversationStore> = Arc::new(repo.clone());
    let directory: Arc<dyn AgentDirectory> = Arc::new(repo);

    let registry = Arc::new(SessionRegistry::new());
    let stt: Arc<dyn SpeechToText> = Arc::new(DeepgramStt::new(config.stt.clone()));
    let synthesizer: Arc<dyn TextToSpeech> = Arc::new(ElevenLabsTts::new(config.tts.clone()));
    let responder: Arc<dyn ResponseGenerator> = Arc::new(GeminiResponder::new(
        config.llm.clone(),
        Arc::clone(&store),
        Arc::clone(&directory),
    ));

    let _keepalive = IdleKeepAlive::new(Arc::clone(&registry), &config.keepalive).spawn();

    let state = Arc::new(ApiState {
        registry,
        stt,
        responder,
        synthesizer,
        store,
        directory,
    });

    tracing::info!(port = cli.port, "voicebridge ready");
    api::serve(state, cli.port).await?;

    Ok(())
}
