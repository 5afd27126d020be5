//! Writer-process context
//!
//! Built once at startup and handed by reference to the ingestion loop and
//! the synchronizer. Owns the store handle, the three buffers and the clock.

use super::buffer::SeriesBuffers;
use super::clock::Clock;
use super::config::RetentionPolicy;
use super::db::TimeSeriesStore;
use std::sync::Arc;

pub struct PipelineContext {
    pub store: Arc<dyn TimeSeriesStore>,
    pub buffers: SeriesBuffers,
    pub clock: Arc<dyn Clock>,
    pub retention: RetentionPolicy,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            buffers: SeriesBuffers::new(),
            clock,
            retention,
        }
    }
}
