#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # fairq-core
//!
//! Fair round-robin dispatch of artifact-processing work to out-of-process
//! workers, with an AMQP bridge for their asynchronous results.
//!
//! ## Overview
//!
//! Uploaded documents and recorded interrogation answers are queued as task
//! records. Instead of draining the queue in global FIFO order, the scheduler
//! rotates across tenants with pending work, so one tenant uploading a large
//! batch cannot starve the others. Dispatched work is published to a RabbitMQ
//! topic exchange; workers report back on result queues, and each result moves
//! both the task record and the artifact it concerns.
//!
//! ## Module Organization
//!
//! - [`models`] - Task records and artifact status enums
//! - [`state_machine`] - Pure task-record transition rules
//! - [`store`] - Durable task queue (PostgreSQL, in-memory)
//! - [`domain`] - Artifact repository, workspace access and push notifications
//! - [`messaging`] - Broker topology, wire messages and the RabbitMQ bridge
//! - [`orchestration`] - Scheduler, result consumers, housekeeping, bootstrap
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fairq_core::config::ConfigManager;
//! use fairq_core::domain::BroadcastNotificationSink;
//! use fairq_core::orchestration::ProcessingSystem;
//!
//! # async fn example() -> fairq_core::Result<()> {
//! let manager = ConfigManager::load()?;
//! let sink = Arc::new(BroadcastNotificationSink::new(1024));
//! let system = ProcessingSystem::connect(manager.config().clone(), sink).await?;
//! let handle = system.start().await?;
//! // ...
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Every backend has an in-memory counterpart, so the full pipeline runs in
//! tests without PostgreSQL or RabbitMQ:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, FairqConfig};
pub use error::{FairqError, Result};
pub use models::{ArtifactKind, ArtifactRef, NewTaskRecord, TaskId, TaskRecord};
pub use orchestration::{ProcessingSystem, ProcessingSystemHandle};
pub use state_machine::TaskState;
