//! CLI command definitions for briefcast.
//!
//! The binary has four jobs: run the stage workers (`serve`), perform the
//! daily fan-out (`schedule`, intended to be invoked by cron), and inspect
//! queue state (`queues`, `dead-letter`).

use clap::Parser;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::dialogue::LlmDialogueWriter;
use crate::jobs::{AudioRequest, FetchRequest, JobRequest, ScriptRequest, UploadRequest};
use crate::metrics;
use crate::queue::{
    MessageSink, StageQueue, WorkerPool, WorkerPoolConfig, AUDIO_QUEUE, FETCH_QUEUE, JOBS_QUEUE,
    SCRIPT_QUEUE, UPLOAD_QUEUE,
};
use crate::search::WebSearchClient;
use crate::speech::{DialogueSpeechClient, VoiceMap};
use crate::stages::{
    AudioGenerator, DailyScheduler, DataFetcher, Orchestrator, ScriptGenerator, Uploader,
};
use crate::stages::fetcher::FetchLimits;
use crate::storage::Database;
use crate::store::RedisJobStore;
use crate::upload::ObjectStoreAudioStorage;

/// Personalized civic audio brief pipeline.
#[derive(Parser)]
#[command(name = "briefcast")]
#[command(about = "Queue-driven pipeline turning policy interests into daily audio briefs")]
#[command(version)]
#[command(
    long_about = "briefcast runs the brief generation pipeline: a daily scheduler fans one job\nout per user, and five stage workers (orchestrate, fetch, script, audio, upload)\ncoordinate through Redis queues to produce a personalized two-voice podcast.\n\nExample usage:\n  briefcast serve --workers 2\n  briefcast schedule"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run workers for all pipeline stages until interrupted.
    Serve(ServeArgs),

    /// Enqueue one brief job per user (the daily fan-out).
    ///
    /// Intended to be invoked once per day by cron or a systemd timer; the
    /// run itself is one-shot.
    Schedule,

    /// Print pending/processing/delayed/dead-letter depths for every queue.
    Queues,

    /// Peek at dead-lettered messages for one stage queue.
    #[command(name = "dead-letter")]
    DeadLetter(DeadLetterArgs),
}

/// Arguments for `briefcast serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Workers per stage (overrides BRIEFCAST_WORKERS).
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Arguments for `briefcast dead-letter`.
#[derive(Parser, Debug)]
pub struct DeadLetterArgs {
    /// Stage queue to inspect (jobs, fetch, script, audio, upload).
    pub queue: String,

    /// Maximum entries to show.
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Schedule => run_schedule().await,
        Commands::Queues => run_queues().await,
        Commands::DeadLetter(args) => run_dead_letter(args).await,
    }
}

/// Connects a shared Redis connection manager.
async fn connect_redis(config: &Config) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}

/// Runs workers for all five pipeline stages until Ctrl-C.
async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(workers) = args.workers {
        config.workers_per_stage = workers;
    }
    config.validate()?;

    metrics::init_metrics()?;

    let conn = connect_redis(&config).await?;
    let store = Arc::new(RedisJobStore::from_connection(conn.clone()));
    let db = Arc::new(Database::connect(&config.database_url).await?);

    let jobs_queue = Arc::new(
        StageQueue::<JobRequest>::from_connection(conn.clone(), &config.queue_name(JOBS_QUEUE))
            .with_max_attempts(config.max_attempts),
    );
    let fetch_queue = Arc::new(
        StageQueue::<FetchRequest>::from_connection(conn.clone(), &config.queue_name(FETCH_QUEUE))
            .with_max_attempts(config.max_attempts),
    );
    let script_queue = Arc::new(
        StageQueue::<ScriptRequest>::from_connection(conn.clone(), &config.queue_name(SCRIPT_QUEUE))
            .with_max_attempts(config.max_attempts),
    );
    let audio_queue = Arc::new(
        StageQueue::<AudioRequest>::from_connection(conn.clone(), &config.queue_name(AUDIO_QUEUE))
            .with_max_attempts(config.max_attempts),
    );
    let upload_queue = Arc::new(
        StageQueue::<UploadRequest>::from_connection(conn.clone(), &config.queue_name(UPLOAD_QUEUE))
            .with_max_attempts(config.max_attempts),
    );

    let search = Arc::new(WebSearchClient::from_env()?);
    let writer = Arc::new(LlmDialogueWriter::from_env()?);
    let speech = Arc::new(DialogueSpeechClient::from_env()?);
    let voices = VoiceMap::from_env()?;
    let audio_storage = Arc::new(ObjectStoreAudioStorage::from_env()?);

    let orchestrator = Arc::new(
        Orchestrator::new(
            store.clone(),
            fetch_queue.clone() as Arc<dyn MessageSink<FetchRequest>>,
        )
        .with_retry_delay(config.retry_delay),
    );
    let fetcher = Arc::new(
        DataFetcher::new(
            db.clone(),
            store.clone(),
            search,
            script_queue.clone() as Arc<dyn MessageSink<ScriptRequest>>,
            FetchLimits {
                bill_window_days: config.bill_window_days,
                max_bills: config.max_bills,
                max_news: config.max_news,
            },
        )
        .with_retry_delay(config.retry_delay),
    );
    let scripter = Arc::new(
        ScriptGenerator::new(
            store.clone(),
            writer,
            audio_queue.clone() as Arc<dyn MessageSink<AudioRequest>>,
        )
        .with_retry_delay(config.retry_delay),
    );
    let synthesizer = Arc::new(
        AudioGenerator::new(
            store.clone(),
            speech,
            voices,
            upload_queue.clone() as Arc<dyn MessageSink<UploadRequest>>,
        )
        .with_retry_delay(config.audio_retry_delay),
    );
    let uploader = Arc::new(
        Uploader::new(store.clone(), audio_storage, db.clone())
            .with_retry_delay(config.retry_delay),
    );

    let pool_config = WorkerPoolConfig::new(config.workers_per_stage);

    let mut orchestrate_pool = WorkerPool::new(pool_config.clone(), jobs_queue, orchestrator);
    let mut fetch_pool = WorkerPool::new(pool_config.clone(), fetch_queue, fetcher);
    let mut script_pool = WorkerPool::new(pool_config.clone(), script_queue, scripter);
    let mut audio_pool = WorkerPool::new(pool_config.clone(), audio_queue, synthesizer);
    let mut upload_pool = WorkerPool::new(pool_config, upload_queue, uploader);

    orchestrate_pool.start().await?;
    fetch_pool.start().await?;
    script_pool.start().await?;
    audio_pool.start().await?;
    upload_pool.start().await?;

    info!(
        workers_per_stage = config.workers_per_stage,
        "Pipeline running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    orchestrate_pool.shutdown().await?;
    fetch_pool.shutdown().await?;
    script_pool.shutdown().await?;
    audio_pool.shutdown().await?;
    upload_pool.shutdown().await?;

    for (stage, stats) in [
        ("orchestrate", orchestrate_pool.stats()),
        ("fetch", fetch_pool.stats()),
        ("script", script_pool.stats()),
        ("audio", audio_pool.stats()),
        ("upload", upload_pool.stats()),
    ] {
        info!(
            stage,
            completed = stats.completed,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            "Final stage counters"
        );
    }

    Ok(())
}

/// Performs the daily fan-out: one job request per user with an email.
async fn run_schedule() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let conn = connect_redis(&config).await?;
    let db = Arc::new(Database::connect(&config.database_url).await?);
    let jobs_queue = Arc::new(
        StageQueue::<JobRequest>::from_connection(conn, &config.queue_name(JOBS_QUEUE))
            .with_max_attempts(config.max_attempts),
    );

    let scheduler = DailyScheduler::new(db, jobs_queue);
    let summary = scheduler.run_once().await?;

    println!(
        "Scheduled {} brief jobs ({} enqueue failures)",
        summary.enqueued, summary.failed
    );
    Ok(())
}

/// Prints depths for every stage queue.
async fn run_queues() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let conn = connect_redis(&config).await?;

    let jobs =
        StageQueue::<JobRequest>::from_connection(conn.clone(), &config.queue_name(JOBS_QUEUE));
    let fetch =
        StageQueue::<FetchRequest>::from_connection(conn.clone(), &config.queue_name(FETCH_QUEUE));
    let script = StageQueue::<ScriptRequest>::from_connection(
        conn.clone(),
        &config.queue_name(SCRIPT_QUEUE),
    );
    let audio =
        StageQueue::<AudioRequest>::from_connection(conn.clone(), &config.queue_name(AUDIO_QUEUE));
    let upload =
        StageQueue::<UploadRequest>::from_connection(conn, &config.queue_name(UPLOAD_QUEUE));

    let (jobs, fetch, script, audio, upload) = tokio::try_join!(
        jobs.stats(),
        fetch.stats(),
        script.stats(),
        audio.stats(),
        upload.stats()
    )?;

    println!(
        "{:<20} {:>8} {:>11} {:>8} {:>12}",
        "queue", "pending", "processing", "delayed", "dead_letter"
    );
    for stats in [jobs, fetch, script, audio, upload] {
        println!(
            "{:<20} {:>8} {:>11} {:>8} {:>12}",
            stats.queue_name, stats.pending, stats.processing, stats.delayed, stats.dead_letter
        );
    }

    Ok(())
}

/// Prints dead-lettered entries for one stage queue.
async fn run_dead_letter(args: DeadLetterArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let conn = connect_redis(&config).await?;
    let name = config.queue_name(&args.queue);

    let entries = match args.queue.as_str() {
        "jobs" => {
            StageQueue::<JobRequest>::from_connection(conn, &name)
                .peek_dead_letter(args.limit)
                .await?
        }
        "fetch" => {
            StageQueue::<FetchRequest>::from_connection(conn, &name)
                .peek_dead_letter(args.limit)
                .await?
        }
        "script" => {
            StageQueue::<ScriptRequest>::from_connection(conn, &name)
                .peek_dead_letter(args.limit)
                .await?
        }
        "audio" => {
            StageQueue::<AudioRequest>::from_connection(conn, &name)
                .peek_dead_letter(args.limit)
                .await?
        }
        "upload" => {
            StageQueue::<UploadRequest>::from_connection(conn, &name)
                .peek_dead_letter(args.limit)
                .await?
        }
        other => anyhow::bail!(
            "unknown queue '{}' (expected jobs, fetch, script, audio, or upload)",
            other
        ),
    };

    if entries.is_empty() {
        println!("No dead-lettered messages in {}", name);
        return Ok(());
    }

    for entry in entries {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }

    Ok(())
}
