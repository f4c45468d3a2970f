//! Read side of the order service.
//!
//! This crate provides:
//! - [`OrderProjection`], the denormalized order document, and its patches
//! - pure projection handlers and the [`EventDispatcher`] that routes events to them
//! - [`ProjectionProcessor`] with per-aggregate checkpoints, catch-up and rebuild
//! - [`ProjectionWorker`] for asynchronous delivery from the command side
//! - [`OrderQueries`] over in-memory and PostgreSQL projection stores

pub mod config;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod postgres;
pub mod processor;
pub mod queries;
pub mod store;
pub mod worker;

pub use config::ProjectionConfig;
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use document::{OrderProjection, OrderProjectionPatch};
pub use error::{ProjectionError, Result};
pub use handlers::{HandlerFn, IgnoreReason, ProjectionChange};
pub use memory::InMemoryProjectionStore;
pub use postgres::PostgresProjectionStore;
pub use processor::ProjectionProcessor;
pub use queries::OrderQueries;
pub use store::ProjectionStore;
pub use worker::{ChannelPublisher, ProjectionWorker};
