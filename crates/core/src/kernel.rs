//! `Kernel` holds every dependency the worker and booking service need: one
//! struct of `Arc<dyn Trait>` fields built once at startup and threaded
//! through, rather than module-level test overrides standing in for real
//! dependency injection.

use crate::classifier::AiClassifier;
use crate::config::Config;
use crate::queue::QueueAdapter;
use crate::showing_service::BookingStore;
use connectors::registry::ConnectorRegistry;
use std::sync::Arc;

pub struct Kernel {
    pub config: Config,
    pub queue: Arc<dyn QueueAdapter>,
    pub connectors: Arc<ConnectorRegistry>,
    pub classifier: Option<Arc<dyn AiClassifier + Send + Sync>>,
    pub rules: Arc<dyn crate::pipeline::stores::RuleStore>,
    pub templates: Arc<dyn crate::pipeline::stores::TemplateStore>,
    pub slots: Arc<dyn crate::pipeline::stores::SlotStore>,
    pub bookings: Arc<dyn BookingStore>,
}

impl Kernel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        queue: Arc<dyn QueueAdapter>,
        connectors: Arc<ConnectorRegistry>,
        classifier: Option<Arc<dyn AiClassifier + Send + Sync>>,
        rules: Arc<dyn crate::pipeline::stores::RuleStore>,
        templates: Arc<dyn crate::pipeline::stores::TemplateStore>,
        slots: Arc<dyn crate::pipeline::stores::SlotStore>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            config,
            queue,
            connectors,
            classifier,
            rules,
            templates,
            slots,
            bookings,
        }
    }
}
