use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swing_submit::config::{ensure_logs_dir, load_config, SubmissionMode};
use swing_submit::events::ConsoleEventHandler;
use swing_submit::logging::init_logging;
use swing_submit::submission::{
    spawn_persist_feedback, FeedbackRecord, SubmissionMetadata, SubmissionOrchestrator, VideoFile,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Submit swing videos for analysis
struct Args {
    /// Backend address tried before any guessed candidate
    #[arg(long, global = true, value_name = "URL")]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a video and wait for its analysis
    Submit {
        /// Path to the video file
        file: PathBuf,

        #[arg(long)]
        email: String,

        /// forehand, backhand, serve, ...
        #[arg(long)]
        stroke_type: String,

        /// left or right
        #[arg(long)]
        handedness: String,

        #[arg(long)]
        experience: Option<String>,

        /// Session id to store the outcome under (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,

        #[arg(long, value_enum)]
        mode: Option<SubmissionMode>,
    },
    /// Send post-analysis survey answers
    Feedback {
        #[arg(long)]
        email: String,

        #[arg(long)]
        session_id: Option<String>,

        /// 1 to 5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,

        #[arg(long)]
        helpful: Option<bool>,

        #[arg(long)]
        recommend: Option<bool>,

        #[arg(long)]
        stroke_type: Option<String>,

        #[arg(long)]
        improvement_areas: Option<String>,

        #[arg(long)]
        comments: Option<String>,
    },
    /// Health-check every candidate backend and show which one would be used
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logs_dir = ensure_logs_dir().context("Failed to prepare logs directory")?;
    if let Err(e) = init_logging(&logs_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let mut config = load_config().context("Failed to load configuration")?;
    if let Some(url) = args.backend_url {
        config.backend_url = Some(url);
    }

    match args.command {
        Command::Submit {
            file,
            email,
            stroke_type,
            handedness,
            experience,
            session_id,
            mode,
        } => {
            if let Some(mode) = mode {
                config.mode = mode;
            }

            let video = VideoFile::from_path(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let metadata = SubmissionMetadata {
                email,
                stroke_type,
                handedness,
                experience,
            };
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let orchestrator = SubmissionOrchestrator::from_config(&config)?
                .with_activity_journal(logs_dir);

            let cancel = CancellationToken::new();
            // Separate token so the final line still prints after an interrupt
            let console =
                ConsoleEventHandler::new(orchestrator.events().clone(), CancellationToken::new())
                    .start();

            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling submission");
                    ctrl_c.cancel();
                }
            });

            let outcome = orchestrator
                .submit_with_cancel(&video, &metadata, &session_id, cancel)
                .await;
            let _ = console.await;

            let result = outcome?;
            println!("{}", serde_json::to_string_pretty(result.as_json())?);
            info!(session_id = %session_id, "Result printed");

            orchestrator.drain_persistence().await;
        }
        Command::Feedback {
            email,
            session_id,
            rating,
            helpful,
            recommend,
            stroke_type,
            improvement_areas,
            comments,
        } => {
            let store = SubmissionOrchestrator::from_config(&config)?
                .feedback_store()
                .await?;

            let record = FeedbackRecord {
                email,
                rating,
                helpful,
                comments,
                recommend,
                stroke_type,
                improvement_areas,
                session_id,
            };
            spawn_persist_feedback(store, record)
                .await
                .context("Feedback task panicked")?;
        }
        Command::Probe => {
            let orchestrator = SubmissionOrchestrator::from_config(&config)?;
            let results = orchestrator.probe_candidates().await;
            if results.is_empty() {
                bail!("No candidate backends configured");
            }

            for result in &results {
                let latency = result
                    .latency_ms
                    .map(|ms| format!("{} ms", ms))
                    .unwrap_or_else(|| "-".to_string());
                let state = if result.available { "up" } else { "down" };
                println!("{:<40} {:<5} {}", result.url, state, latency);
            }

            match swing_submit::submission::select_best(&results) {
                Some(endpoint) => println!("selected: {}", endpoint.url),
                None => bail!("No analysis backend reachable ({} candidates tried)", results.len()),
            }
        }
    }

    Ok(())
}
