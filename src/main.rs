use anyhow::{Context, Result};
use clap::Parser;
use lingua_sync::speech::{Alternative, AssessmentScores, RecognitionResult};
use lingua_sync::{
    ChangeFeed, Config, Language, Level, MemoryFeed, MemoryStore, MessageKind, NatsClient,
    OwnerId, Reconciler, RemoteStore, ReplayEngine, RestStore, SpeechConfig, SpeechSession,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lingua-sync", version, about = "Conversation sync client for language practice")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/lingua-sync")]
    config: String,

    /// Use the in-memory backend and a replayed speech engine
    #[arg(long)]
    offline: bool,

    #[arg(long, default_value = "es")]
    language: Language,

    #[arg(long, default_value = "beginner")]
    level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Lingua Sync v{}", env!("CARGO_PKG_VERSION"));

    let (store, feed, result_buffer): (Arc<dyn RemoteStore>, Arc<dyn ChangeFeed>, usize) =
        if args.offline {
            info!("Offline mode: in-memory backend");
            let feed = Arc::new(MemoryFeed::new());
            let owner = OwnerId::new(uuid::Uuid::new_v4().to_string());
            let store: Arc<dyn RemoteStore> =
                Arc::new(MemoryStore::with_feed(Some(owner), Arc::clone(&feed)));
            let feed: Arc<dyn ChangeFeed> = feed;
            (store, feed, 64)
        } else {
            let cfg = Config::load(&args.config)?;
            info!("Loaded config: {}", cfg.service.name);
            info!("Backend: {}", cfg.backend.url);

            let mut store = RestStore::new(&cfg.backend.url, &cfg.backend.api_key);
            match (cfg.backend.access_token, cfg.backend.owner_id) {
                (Some(token), Some(owner)) => {
                    store = store.with_auth(token, OwnerId::new(owner));
                }
                _ => warn!("No access token configured; backend calls will require sign-in"),
            }

            let nats =
                NatsClient::connect(&cfg.change_feed.nats_url, cfg.change_feed.subject_prefix)
                    .await
                    .context("connecting to change feed")?;
            let store: Arc<dyn RemoteStore> = Arc::new(store);
            let feed: Arc<dyn ChangeFeed> = Arc::new(nats);
            (store, feed, cfg.speech.result_buffer)
        };

    let owner = store
        .current_owner()
        .context("no signed-in user; set backend.access_token and backend.owner_id")?;

    let reconciler = Reconciler::new(Arc::clone(&store), feed);
    let sessions = reconciler.refresh_sessions(&owner).await?;
    info!("{} existing session(s)", sessions.len());

    let session = reconciler.create_session(args.language, args.level).await?;
    info!(
        "Created session {} ({} / {:?})",
        session.id, session.language, session.level
    );

    reconciler
        .send_message(&session.id, greeting(args.language), MessageKind::Text, None)
        .await?;

    // pronunciation pass against the same phrase
    let mut speech_config = SpeechConfig::new(args.language, greeting(args.language));
    speech_config.result_buffer = result_buffer;
    let engine = ReplayEngine::new(vec![sample_result(args.language)]);
    let mut speech = SpeechSession::new(speech_config, Box::new(engine));

    speech.start().await?;
    let stats = speech.stop().await?;
    info!(
        "Speech pass finished: {} result(s) in {:.1}s",
        stats.results_count, stats.duration_secs
    );

    let feedback = speech.get_feedback().await;
    match &feedback {
        Some(scores) => info!("Pronunciation score: {:.0}", scores.pronunciation_score),
        None => info!("No pronunciation feedback"),
    }

    reconciler
        .send_message(&session.id, greeting(args.language), MessageKind::Audio, feedback)
        .await?;

    for message in reconciler.messages(&session.id).await {
        info!(
            "#{} [{:?}] {}{}",
            message.sequence_number,
            message.kind,
            message.content,
            message
                .feedback
                .map(|f| format!(" (pronunciation {:.0})", f.pronunciation_score))
                .unwrap_or_default()
        );
    }

    let loading = reconciler.loading().snapshot();
    if loading.values().any(|busy| *busy) {
        warn!("Operations still in flight: {:?}", loading);
    }

    reconciler.shutdown().await;
    Ok(())
}

fn greeting(language: Language) -> &'static str {
    match language {
        Language::En => "Hello",
        Language::Es => "Hola",
        Language::Fr => "Bonjour",
        Language::De => "Hallo",
    }
}

fn sample_result(language: Language) -> RecognitionResult {
    RecognitionResult {
        alternatives: vec![Alternative {
            display: Some(greeting(language).to_string()),
            scores: Some(AssessmentScores {
                accuracy: Some(92.0),
                fluency: Some(88.0),
                completeness: Some(100.0),
                pronunciation: Some(90.5),
            }),
        }],
    }
}
