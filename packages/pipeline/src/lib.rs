//! Core pipeline engine: moves leads through ordered asynchronous
//! processing stages backed by Postgres.
//!
//! The engine is stage-agnostic. Stages are described by [`StageDescriptor`]s
//! and external work always goes through the [`StageService`] trait; all
//! coordination between workers happens in the database.

pub mod classify;
pub mod config;
pub mod poller;
pub mod reclaim;
pub mod resolver;
pub mod services;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod types;
pub mod webhook;
pub mod worker;

// Re-exports for clean API
pub use classify::{classify, FailureKind};
pub use config::{PipelineConfig, StageDescriptor, StageGraph};
pub use poller::{PollStats, PollWorker};
pub use resolver::{JobOutcome, Resolution};
pub use services::{ServiceJobStatus, ServiceKind, ServiceRegistry, StageService};
pub use store::{LeadStore, PostgresLeadStore};
pub use supervisor::{Service, Supervisor};
pub use types::{Lead, Stage, StageState, StageStatus, WebhookEvent};
pub use webhook::{fingerprint, process_notice, CompletionNotice, NoticeStatus, WebhookDisposition};
pub use worker::StageWorker;
