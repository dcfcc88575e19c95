use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::analysis::{run_analysis, AnalysisReport};
use crate::companion::CompanionKind;
use crate::conf::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::flight::SingleFlight;
use crate::metrics::{RequestOutcome, ServiceMetrics};
use crate::store::LogStore;

/// Shared service state: storage, per-digest single-flight and counters.
#[derive(Debug)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: LogStore,
    pub flight: SingleFlight,
    pub metrics: ServiceMetrics,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> ServiceResult<Arc<Self>> {
        let store = LogStore::open(&config)?;
        Ok(Arc::new(Self {
            config: Arc::new(config),
            store,
            flight: SingleFlight::new(),
            metrics: ServiceMetrics::new(),
        }))
    }

    /// Store a log with its companions and return the digest.
    pub async fn ingest(&self, log: Vec<u8>, companions: Vec<(CompanionKind, Vec<u8>)>) -> ServiceResult<String> {
        let store = self.store.clone();
        let digest = blocking(move || store.put_log(&log)).await?;

        // Attaching invalidates derived output; keep it out of a running pass.
        for (kind, bytes) in companions {
            self.flight
                .run(&digest, |_| {
                    let store = self.store.clone();
                    let digest = digest.clone();
                    blocking(move || store.attach_companion(&digest, kind, &bytes))
                })
                .await?;
        }
        Ok(digest)
    }

    /// Report for a stored log: cached if present, otherwise one engine pass
    /// shared by every concurrent caller.
    pub async fn analyze(&self, digest: &str) -> ServiceResult<AnalysisReport> {
        let result = self
            .flight
            .run(digest, |waited| async move {
                if let Some(report) = self.store.cached_summary::<AnalysisReport>(digest)? {
                    debug!(%digest, waited, "state: serving cached report");
                    let outcome = if waited {
                        RequestOutcome::Coalesced
                    } else {
                        RequestOutcome::CacheHit
                    };
                    return Ok::<_, ServiceError>((report, outcome));
                }

                let store = self.store.clone();
                let model = self.config.capacity;
                let owned = digest.to_string();
                let started = Instant::now();
                let report = blocking(move || run_analysis(&store, &owned, model)).await?;

                let stats = &report.summary.stats;
                self.metrics.record_run(
                    stats.lines,
                    stats.samples,
                    report.events,
                    started.elapsed().as_nanos() as u64,
                );
                Ok((report, RequestOutcome::Analyzed))
            })
            .await;

        match result {
            Ok((report, outcome)) => {
                self.metrics.record_request(outcome);
                Ok(report)
            }
            Err(err) => {
                self.metrics.record_request(if err.is_unsupported() {
                    RequestOutcome::Unsupported
                } else {
                    RequestOutcome::Failed
                });
                Err(err)
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ServiceError::Io(std::io::Error::other(err)))?
}
