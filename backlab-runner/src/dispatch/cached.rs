use std::sync::Arc;

use tracing::debug;

use super::{Backend, BackendError, BackendKind, CpuBackend};
use crate::dispatch::cache::ResultCache;
use crate::runner::{BacktestJob, BacktestResult};

/// Reference backend behind a content-addressed result cache.
///
/// A hit returns the stored result for identical bars, parameters and
/// benchmark; a miss computes on the CPU and stores the result.
pub struct CachedBackend {
    cache: Arc<dyn ResultCache>,
    inner: CpuBackend,
}

impl CachedBackend {
    pub fn new(cache: Arc<dyn ResultCache>) -> Self {
        Self {
            cache,
            inner: CpuBackend,
        }
    }

    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.cache
    }
}

impl Backend for CachedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cached
    }

    fn execute(&self, job: &BacktestJob) -> Result<BacktestResult, BackendError> {
        let key = job.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "result cache hit");
            return Ok(hit);
        }
        let result = self.inner.execute(job)?;
        self.cache.put(key, result.clone());
        Ok(result)
    }
}
