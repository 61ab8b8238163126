//! The leasing-inquiry decision-and-dispatch pipeline. `connectors` owns the
//! platform-facing edge; this crate owns everything from claim to dispatch:
//! classification, guardrails, templating, workflow persistence, showing
//! booking, and the worker loop that ties them together.

pub mod audit_log;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod guardrails;
pub mod kernel;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod showing_postgres;
pub mod showing_service;
pub mod template_renderer;
pub mod worker;
pub mod workflow;

pub use config::Config;
pub use kernel::Kernel;
pub use service::Service;
pub use worker::Worker;
