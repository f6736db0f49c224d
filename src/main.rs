use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use v1_sync::init_sled_db;
use v1_sync::metrics;
use v1_sync::CacheSettings;
use v1_sync::CachedValue;
use v1_sync::ConsumerPool;
use v1_sync::Dispatcher;
use v1_sync::EventSource;
use v1_sync::HandlerRegistry;
use v1_sync::HttpOrigin;
use v1_sync::KvLockManager;
use v1_sync::ListMutator;
use v1_sync::LocalMessage;
use v1_sync::LocalStream;
use v1_sync::LookupResponder;
use v1_sync::MembershipHandler;
use v1_sync::MutationPolicy;
use v1_sync::PayloadCodec;
use v1_sync::Result;
use v1_sync::SledBucket;
use v1_sync::StaleWhileRevalidateCache;
use v1_sync::StorageError;
use v1_sync::SyncConfig;
use v1_sync::SystemClock;
use v1_sync::VersionedObjectStore;

/// One line of replay input
#[derive(Debug, Deserialize)]
struct ReplayEnvelope {
    /// `kv`, `wal`, `stream`, `lookup` or `org`
    source: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    /// Strings are sent as-is, anything else as JSON
    #[serde(default)]
    data: Value,
}

impl ReplayEnvelope {
    fn payload(&self) -> Vec<u8> {
        match &self.data {
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        }
    }
}

struct Streams {
    key_watch: LocalStream,
    log_change: LocalStream,
    table_stream: LocalStream,
}

impl Streams {
    fn close(&self) {
        self.key_watch.close();
        self.log_change.close();
        self.table_stream.close();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let config = SyncConfig::new()?.validate()?;
    init_observability(&config.observability.log_filter);
    if let Err(e) = metrics::register_custom_metrics(&metrics::REGISTRY) {
        warn!("failed to register metrics: {}", e);
    }
    debug!(?config, "configuration loaded");

    let db = init_sled_db(&config.store.db_root_dir).map_err(StorageError::IoError)?;
    let objects = Arc::new(SledBucket::open(&db, &config.store.objects_bucket)?);
    let mappings = Arc::new(SledBucket::open(&db, &config.store.mappings_bucket)?);
    let codec = PayloadCodec::new(config.store.format);
    let detached = TaskTracker::new();

    let lists = ListMutator::new(
        mappings.clone(),
        detached.clone(),
        MutationPolicy::from(&config.membership),
    );
    let registry = HandlerRegistry::new().with_handler(
        config.membership.source_prefix.clone(),
        Arc::new(MembershipHandler::new(lists, &config.membership)),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        VersionedObjectStore::new(objects.clone(), codec.clone()),
        Arc::new(registry),
        codec,
        config.dispatch.clone(),
    ));

    let clock = Arc::new(SystemClock);
    let origin = HttpOrigin::new(
        config.cache.origin_base_url.clone(),
        config.cache.required_field.clone(),
        config.cache.origin_timeout(),
    )?;
    let cache = StaleWhileRevalidateCache::new(
        mappings.clone(),
        Arc::new(KvLockManager::new(mappings.clone(), clock.clone())),
        Arc::new(origin),
        clock,
        CacheSettings::from(&config.cache),
        detached.clone(),
    );
    let lookups = LookupResponder::new(mappings.clone());

    let streams = Arc::new(Streams {
        key_watch: LocalStream::new("key_watch", config.consumer.key_watch.max_deliver),
        log_change: LocalStream::new("log_change", config.consumer.log_change.max_deliver),
        table_stream: LocalStream::new("table_stream", config.consumer.table_stream.max_deliver),
    });
    let shutdown = CancellationToken::new();

    let pools = TaskTracker::new();
    for (source, stream, policy) in [
        (EventSource::KeyWatch, &streams.key_watch, config.consumer.key_watch),
        (EventSource::LogChange, &streams.log_change, config.consumer.log_change),
        (EventSource::TableStream, &streams.table_stream, config.consumer.table_stream),
    ] {
        let pool = ConsumerPool::new(dispatcher.clone(), source, policy);
        let subscription = stream.subscribe();
        let shutdown = shutdown.clone();
        pools.spawn(async move {
            if let Err(e) = pool.run(subscription, shutdown).await {
                error!(source = source.label(), "consumer pool failed: {:?}", e);
            }
        });
    }
    pools.close();

    {
        let shutdown = shutdown.clone();
        let streams = streams.clone();
        tokio::spawn(async move {
            if let Err(e) = graceful_shutdown(shutdown).await {
                error!("Failed to shutdown: {:?}", e);
            }
            streams.close();
        });
    }

    info!("replaying envelopes from stdin");
    let replay = replay_stdin(&streams, &lookups, &cache, &shutdown);
    tokio::select! {
        result = replay => {
            if let Err(e) = result {
                error!("replay stopped: {:?}", e);
            }
        }
        _ = shutdown.cancelled() => {}
    }
    streams.close();

    pools.wait().await;
    detached.close();
    detached.wait().await;

    objects.flush()?;
    mappings.flush()?;
    debug!("final metrics:\n{}", metrics::gather_text(&metrics::REGISTRY));
    info!("Exiting program.");
    Ok(())
}

async fn replay_stdin(
    streams: &Streams,
    lookups: &LookupResponder<SledBucket>,
    cache: &StaleWhileRevalidateCache<SledBucket>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.map_err(StorageError::IoError)? {
        if shutdown.is_cancelled() {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let envelope: ReplayEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("skipping malformed replay line: {}", e);
                continue;
            }
        };

        let stream = match envelope.source.as_str() {
            "kv" => &streams.key_watch,
            "wal" => &streams.log_change,
            "stream" => &streams.table_stream,
            "lookup" => {
                let reply = lookups.respond(&envelope.payload()).await;
                write_reply(&mut stdout, &envelope, String::from_utf8_lossy(&reply).into_owned()).await?;
                continue;
            }
            "org" => {
                let id = String::from_utf8_lossy(&envelope.payload()).into_owned();
                let reply = match cache.lookup(&id).await {
                    Ok(CachedValue::Found { value }) => value.to_string(),
                    Ok(CachedValue::Negative { reason }) => format!("not found: {reason}"),
                    Err(e) => format!("error: {e}"),
                };
                write_reply(&mut stdout, &envelope, reply).await?;
                continue;
            }
            other => {
                warn!(source = other, "unknown replay source, skipping");
                continue;
            }
        };

        let mut message = LocalMessage::new(envelope.subject.clone(), envelope.payload());
        message.headers = envelope.headers;
        stream.publish(message)?;
    }
    Ok(())
}

async fn write_reply(
    stdout: &mut tokio::io::Stdout,
    envelope: &ReplayEnvelope,
    reply: String,
) -> Result<()> {
    let line = serde_json::json!({
        "source": envelope.source,
        "request": envelope.data,
        "reply": reply,
    });
    stdout
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(StorageError::IoError)?;
    Ok(())
}

async fn graceful_shutdown(shutdown: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(StorageError::IoError)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(StorageError::IoError)?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    shutdown.cancel();
    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("logging already initialised: {e}");
    }
}
