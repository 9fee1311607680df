//! qsource · Adaptive Question Sourcing Engine
//!
//! Given a topic node, produces a scoped set of assessment questions by reusing
//! vetted content from a canonical bank (semantic retrieval + rerank) and
//! generating only what is missing, behind a quality gate.

pub mod bridge;
pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod jobs;
pub mod openai;
pub mod planner;
pub mod protocol;
pub mod provider;
pub mod quality;
pub mod retriever;
pub mod routes;
pub mod seeds;
pub mod slots;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
