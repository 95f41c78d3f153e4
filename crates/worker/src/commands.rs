//! CLI command definitions and the store wiring they run against.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use docfleet_core::{RequestId, WorkerInfo};
use docfleet_infra::blob::LocalBlobStore;
use docfleet_infra::checkpoint::{CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
use docfleet_infra::config::{ConfigError, HeartbeatConfig, PipelineConfig, StorageConfig, WorkerIdentity};
use docfleet_infra::heartbeat::{HeartbeatEmitter, HeartbeatHandle};
use docfleet_infra::ingest::{IngestError, IngestionService};
use docfleet_infra::model::{ExtractiveGenerator, HashEmbedder};
use docfleet_infra::pipeline::{EmbeddingProcessor, PipelineDriver};
use docfleet_infra::postgres::PgBridge;
use docfleet_infra::registry::{InMemoryWorkerRegistry, PostgresWorkerRegistry, WorkerRegistry};
use docfleet_infra::retrieval::RetrievalService;
use docfleet_infra::vector::InMemoryVectorStore;
use docfleet_observability::LogFormat;

/// docfleet worker: document ingestion and retrieval QA for one tenant.
#[derive(Parser)]
#[command(name = "docfleet-worker", version, long_about = None)]
pub(crate) struct Cli {
    /// Log format: json or pretty. Defaults to DOCFLEET_LOG_FORMAT, then json.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Directory holding request buckets.
    #[arg(long, env = "DOCFLEET_BLOB_ROOT", default_value = "var/blobs", global = true)]
    pub blob_root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Store a document and run the chunk pipeline over it.
    Ingest {
        /// Text file to ingest; form feeds separate pages.
        path: PathBuf,

        /// Document name, used as the request id (defaults to the file stem).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Continue a failed or interrupted request from its last checkpoint.
    Resume { request_id: String },

    /// List requests waiting for a resume.
    Failed,

    /// Answer a question from a processed document.
    Ask { request_id: String, question: String },

    /// Register and send heartbeats until interrupted.
    Serve,
}

impl Command {
    fn request_id(&self) -> Option<&str> {
        match self {
            Self::Resume { request_id } | Self::Ask { request_id, .. } => Some(request_id),
            Self::Ingest { .. } | Self::Failed | Self::Serve => None,
        }
    }
}

/// Durable collaborators of one worker process.
pub(crate) struct Stores {
    registry: Arc<dyn WorkerRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    blobs: Arc<LocalBlobStore>,
    vectors: Arc<InMemoryVectorStore>,
}

impl Stores {
    pub(crate) async fn open(blob_root: &Path, storage: &StorageConfig) -> Result<Self> {
        let (registry, checkpoints): (Arc<dyn WorkerRegistry>, Arc<dyn CheckpointStore>) =
            match &storage.database_url {
                Some(url) => {
                    let pg = PgBridge::connect(url).await.context("connecting to postgres")?;
                    pg.ensure_schema().await.context("creating schema")?;
                    (
                        Arc::new(PostgresWorkerRegistry::new(pg.clone())),
                        Arc::new(PostgresCheckpointStore::new(pg)),
                    )
                }
                None => {
                    warn!("DATABASE_URL not set; checkpoints and registry do not survive this process");
                    (
                        Arc::new(InMemoryWorkerRegistry::new()),
                        Arc::new(InMemoryCheckpointStore::new()),
                    )
                }
            };

        Ok(Self {
            registry,
            checkpoints,
            blobs: Arc::new(LocalBlobStore::new(blob_root)),
            vectors: Arc::new(InMemoryVectorStore::new()),
        })
    }
}

/// Run one command. Must be called off the async runtime's worker threads.
pub(crate) fn run(cli: Cli, stores: Stores) -> Result<()> {
    let heartbeat = start_heartbeat(&cli.command, &stores)?;
    let outcome = execute(cli.command, &stores);
    if let Some(handle) = heartbeat {
        handle.shutdown();
    }
    outcome
}

/// Register this worker and start its heartbeat. Without an injected
/// identity the command still runs, unregistered.
fn start_heartbeat(command: &Command, stores: &Stores) -> Result<Option<HeartbeatHandle>> {
    let identity = match WorkerIdentity::from_env() {
        Ok(identity) => identity,
        Err(ConfigError::Missing(var)) => {
            warn!(missing = var, "no worker identity; running without heartbeats");
            return Ok(None);
        }
        Err(e) => return Err(e).context("reading worker identity"),
    };

    stores
        .registry
        .put_worker_info(&WorkerInfo {
            container_id: identity.container_id.clone(),
            tenant: identity.tenant.clone(),
            role: identity.role,
            zone: identity.zone.clone(),
            registered_at: Utc::now(),
        })
        .context("registering worker")?;
    info!(container_id = %identity.container_id, tenant = %identity.tenant, role = %identity.role, "worker registered");

    let mut emitter = HeartbeatEmitter::new(&HeartbeatConfig::from_env()?);
    if let Some(request_id) = command.request_id().and_then(|r| RequestId::new(r).ok()) {
        emitter = emitter.with_request_id(request_id);
    }
    let handle = emitter
        .spawn(&identity, stores.registry.clone())
        .context("starting heartbeat thread")?;
    Ok(Some(handle))
}

fn execute(command: Command, stores: &Stores) -> Result<()> {
    match command {
        Command::Ingest { path, name } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let name = match name {
                Some(name) => name,
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("cannot derive a name from {}; pass --name", path.display()))?,
            };
            let service = ingestion(stores)?;
            let report = service
                .submit(&name, &text)
                .map_err(|e| report_ingest_error(e, RequestId::new(&name).ok().as_ref()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Resume { request_id } => {
            let request_id = RequestId::new(request_id)?;
            let report = ingestion(stores)?
                .resume(&request_id)
                .map_err(|e| report_ingest_error(e, Some(&request_id)))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Failed => {
            for request_id in ingestion(stores)?.failed_requests()? {
                println!("{request_id}");
            }
        }
        Command::Ask {
            request_id,
            question,
        } => {
            let request_id = RequestId::new(request_id)?;
            let service = RetrievalService::new(
                HashEmbedder::default(),
                stores.vectors.clone(),
                stores.blobs.clone(),
                ExtractiveGenerator,
            );
            service.load_index(&request_id)?;
            let answer = service.answer(&request_id, &question)?;
            println!("{}", answer.text);
        }
        Command::Serve => {
            let runtime = tokio::runtime::Handle::current();
            info!("serving; interrupt to stop");
            runtime
                .block_on(tokio::signal::ctrl_c())
                .context("waiting for shutdown signal")?;
            info!("shutdown requested");
        }
    }
    Ok(())
}

type Ingestion = IngestionService<
    Arc<dyn CheckpointStore>,
    EmbeddingProcessor<HashEmbedder, Arc<InMemoryVectorStore>, Arc<LocalBlobStore>>,
    Arc<LocalBlobStore>,
>;

fn ingestion(stores: &Stores) -> Result<Ingestion> {
    let splitter = PipelineConfig::from_env()?.splitter()?;
    let processor = EmbeddingProcessor::new(HashEmbedder::default(), stores.vectors.clone(), stores.blobs.clone());
    let driver = PipelineDriver::new(stores.checkpoints.clone(), processor, splitter);
    Ok(IngestionService::new(driver, stores.blobs.clone()))
}

fn report_ingest_error(err: IngestError, request_id: Option<&RequestId>) -> anyhow::Error {
    let next_step = err.next_step(request_id);
    error!(error = %err, next_step = %next_step, "ingestion failed");
    anyhow!("{err}; next step: {next_step}")
}
