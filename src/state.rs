//! Application state: the sourcing engine, maintenance jobs and the job secret.
//!
//! `AppState::from_env` wires the standalone service:
//!   - config from TOML (or defaults)
//!   - the in-memory store, seeded from the config catalog or the built-in demo catalog
//!   - the OpenAI client, or `Disabled` when no key is present (cache-only serving)
//!   - the embedding worker

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_config_from_env, AppConfig};
use crate::domain::TopicNode;
use crate::engine::{Collaborators, SourcingEngine};
use crate::ingest::EmbeddingQueue;
use crate::jobs::MaintenanceJobs;
use crate::openai::OpenAI;
use crate::provider::{Disabled, Embedder, Generator};
use crate::seeds::seed_topics;
use crate::store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SourcingEngine>,
    pub jobs: Arc<MaintenanceJobs>,
    /// Shared secret for the maintenance endpoints. `None` locks them.
    pub job_secret: Option<String>,
}

impl AppState {
    pub fn new(engine: SourcingEngine, jobs: MaintenanceJobs, job_secret: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            jobs: Arc::new(jobs),
            job_secret,
        }
    }

    /// Build state from env: load config, seed the store, init model services.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Self {
        let cfg = load_config_from_env().unwrap_or_default();
        let store = Arc::new(MemoryStore::new());
        seed_store(&store, &cfg).await;

        let (embedder, generator): (Arc<dyn Embedder>, Arc<dyn Generator>) = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "qsource", base_url = %oa.base_url, question_model = %oa.question_model, embedding_model = %oa.embedding_model, "OpenAI enabled.");
                let oa = Arc::new(oa);
                (oa.clone() as Arc<dyn Embedder>, oa as Arc<dyn Generator>)
            }
            None => {
                warn!(target: "qsource", "OpenAI disabled (no OPENAI_API_KEY). Serving existing scoped sets only.");
                (Arc::new(Disabled) as Arc<dyn Embedder>, Arc::new(Disabled) as Arc<dyn Generator>)
            }
        };

        let (queue, _worker) =
            EmbeddingQueue::spawn(embedder.clone(), store.clone(), cfg.engine.embedding_queue_capacity);

        let collab = Collaborators {
            topics: store.clone(),
            bank: store.clone(),
            vectors: store.clone(),
            scoped: store.clone(),
            embedder: embedder.clone(),
            generator,
        };
        let engine = SourcingEngine::new(collab, &cfg.engine, cfg.prompts.clone(), queue);
        let jobs = MaintenanceJobs::new(store.clone(), store.clone(), store, embedder, cfg.jobs.clone());

        let job_secret = std::env::var("JOBS_API_KEY").ok().filter(|s| !s.is_empty());
        if job_secret.is_none() {
            warn!(target: "qsource", "JOBS_API_KEY not set; maintenance endpoints will reject every call");
        }

        Self::new(engine, jobs, job_secret)
    }
}

/// Load the topic catalog and mastery table into the store.
async fn seed_store(store: &MemoryStore, cfg: &AppConfig) {
    let topics: Vec<TopicNode> = if cfg.topics.is_empty() {
        seed_topics()
    } else {
        cfg.topics
            .iter()
            .map(|t| TopicNode {
                id: t.id.clone(),
                title: t.title.clone(),
                context: t.context.clone(),
                parent_id: t.parent.clone(),
                kind: t.kind,
            })
            .collect()
    };
    let count = topics.len();
    for t in topics {
        store.put_topic(t).await;
    }
    for m in &cfg.mastery {
        store.put_mastery(&m.learner, &m.topic, m.level).await;
    }
    info!(target: "qsource", topics = count, mastery = cfg.mastery.len(), from_config = !cfg.topics.is_empty(), "Topic catalog loaded");
}
