mod config;

use anyhow::Result;
use config::AppConfig;
use relay_stream::{
    ConsumerEvent, CursorStore, FileCursorStore, PollLoop, PrintHandler, RedisCursorStore,
    RedisStreamSource,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_rs=debug,relay_stream=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Relay-RS Stream Consumer");

    // Load configuration
    let config = AppConfig::new()?;
    info!("✅ Configuration loaded successfully");
    info!("🔄 Redis: {}", config.redis_url());
    info!(
        "🌊 Stream: {}.{} (start: {:?}, max batch: {})",
        config.redis.namespace,
        config.consumer.stream_key,
        config.consumer.start_position,
        config.consumer.max_batch
    );

    let source = RedisStreamSource::new(
        config.redis_url(),
        &config.redis.namespace,
        &config.consumer.stream_key,
    )?;

    let store: Box<dyn CursorStore> = match &config.checkpoint.path {
        Some(path) => {
            info!("💾 Cursor checkpoint file: {path}");
            Box::new(FileCursorStore::new(path.clone()))
        }
        None => {
            let key = config.cursor_key();
            info!("💾 Cursor checkpoint key: {key}");
            Box::new(RedisCursorStore::new(config.redis_url(), key)?)
        }
    };

    // Report consumer lifecycle events alongside the logs
    let (event_sender, mut event_receiver) = mpsc::unbounded_channel::<ConsumerEvent>();
    let observer_handle = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            match event {
                ConsumerEvent::Delivered { count, cursor } => {
                    info!("📦 Delivered {count} entries, cursor {cursor}");
                }
                ConsumerEvent::HandlerFailed { cursor, error } => {
                    warn!("🔁 Handler failed at {cursor}: {error}");
                }
                ConsumerEvent::Disconnected { error } => {
                    warn!("🔌 Disconnected: {error}");
                }
                ConsumerEvent::Reconnected => info!("🔌 Reconnected"),
                ConsumerEvent::Gap { from, resume } => {
                    error!("⚠️  Data gap: entries after {from} were trimmed, resumed at {resume}");
                }
                ConsumerEvent::CheckpointFailed { error } => {
                    warn!("💾 Checkpoint save failed: {error}");
                }
            }
        }
    });

    // Ctrl+C finishes the current fetch/handle cycle, then stops
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("👋 Shutting down gracefully");
            signal_token.cancel();
        }
    });

    let poll_loop = PollLoop::new(
        source,
        PrintHandler,
        store,
        config.consumer_config(),
        shutdown,
    )
    .with_events(event_sender);

    info!("✅ Consumer started, press Ctrl+C to stop");
    let final_cursor = poll_loop.run().await?;
    info!("🏁 Stopped at cursor {final_cursor}");

    observer_handle.abort();
    Ok(())
}
