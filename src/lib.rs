// src/lib.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use log::{debug, error, info};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

pub mod feature;
pub mod metrics;
pub mod revision;
pub mod snapshot;
pub mod sources;

pub use crate::feature::{
    ActivationStrategy, Constraint, FeatureDependency, FeatureToggleClient, FeatureType, Segment,
    StrategyVariant, Variant, VariantOverride, VariantPayload,
};
pub use crate::metrics::{MetricSample, MetricsSink, NoopMetricsSink};
pub use crate::revision::RevisionNotifier;
pub use crate::snapshot::CacheSnapshot;
pub use crate::sources::{
    ClientFeatureToggleReadModel, EnvironmentFeatures, SegmentReadModel, SourceError,
};

/// Wildcard accepted for both the environment and the project list.
pub const ALL: &str = "*";

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Identifies what a caller of the read API may see: a target environment
/// (a concrete name or [`ALL`]) and the projects it is allowed to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleQuery {
    pub environment: String,
    pub projects: Vec<String>,
}

impl ToggleQuery {
    pub fn new(
        environment: impl Into<String>,
        projects: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            environment: environment.into(),
            projects: projects.into_iter().map(Into::into).collect(),
        }
    }

    pub fn wants_all_environments(&self) -> bool {
        self.environment == ALL
    }

    pub fn allows_project(&self, project: &str) -> bool {
        self.projects.iter().any(|p| p == ALL || p == project)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No snapshot published yet; every read returns empty results.
    Initializing,
    /// A post-ready rebuild is in flight; reads serve the previous snapshot.
    Refreshing,
    Ready,
}

/// Emitted on the channel returned by [`GlobalFrontendApiCache::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// First successful build; fired once per cache instance.
    Ready { duration: Duration },
    /// Every later successful build.
    Updated { duration: Duration },
}

/// Global read cache behind the frontend API.
///
/// Holds one immutable [`CacheSnapshot`] and rebuilds it whenever the
/// [`RevisionNotifier`] signals a configuration change. Reads dereference the
/// currently published snapshot without locking, so they stay cheap no matter
/// how many callers hit them concurrently. A failed rebuild keeps the
/// previous snapshot: the read API is always available, possibly stale.
pub struct GlobalFrontendApiCache {
    snapshot: ArcSwapOption<CacheSnapshot>,
    toggles: Arc<dyn ClientFeatureToggleReadModel>,
    segments: Arc<dyn SegmentReadModel>,
    metrics: Arc<dyn MetricsSink>,
    state: watch::Sender<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl GlobalFrontendApiCache {
    /// The builder subscribes to the notifier right away, so signals fired
    /// between `builder()` and `build()` are not lost.
    pub fn builder(
        toggles: Arc<dyn ClientFeatureToggleReadModel>,
        segments: Arc<dyn SegmentReadModel>,
        notifier: &RevisionNotifier,
    ) -> GlobalFrontendApiCacheBuilder {
        GlobalFrontendApiCacheBuilder {
            toggles,
            segments,
            revisions: notifier.subscribe(),
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    pub fn state(&self) -> CacheState {
        *self.state.borrow()
    }

    /// Resolves once the first snapshot has been published. If the initial
    /// build fails this keeps waiting for a retry triggered by the next
    /// revision signal.
    pub async fn wait_until_ready(&self) {
        let mut state = self.state.subscribe();
        // Cannot fail: the sender lives inside self for the duration of the call.
        let _ = state
            .wait_for(|state| *state != CacheState::Initializing)
            .await;
    }

    /// Receives [`CacheEvent::Ready`] and [`CacheEvent::Updated`]
    /// notifications for every successful build from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn get_segment(&self, id: i32) -> Option<Segment> {
        let snapshot = self.snapshot.load();
        snapshot.as_ref()?.segment(id).cloned()
    }

    pub fn get_toggles(&self, query: &ToggleQuery) -> Vec<FeatureToggleClient> {
        let snapshot = self.snapshot.load();
        match snapshot.as_ref() {
            Some(snapshot) => snapshot.toggles(query).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn get_toggle(&self, name: &str, query: &ToggleQuery) -> Option<FeatureToggleClient> {
        let snapshot = self.snapshot.load();
        snapshot.as_ref()?.toggle(name, query).cloned()
    }

    fn spawn_refresh_worker(self: Arc<Self>, mut revisions: broadcast::Receiver<()>) {
        tokio::spawn(async move {
            self.refresh().await;
            loop {
                match revisions.recv().await {
                    // A lagged receiver still means "something changed".
                    Ok(()) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
                // Drain the backlog: signals that piled up while the previous
                // build was running collapse into this single refresh.
                loop {
                    match revisions.try_recv() {
                        Ok(()) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }
                self.refresh().await;
            }
            debug!("revision notifier dropped, stopping cache refresh worker");
        });
    }

    // Builds run only on the worker task, one at a time. Everything between
    // fetch and publish works on local data; the single `store` below is the
    // point where readers switch from the old snapshot to the new one.
    async fn refresh(&self) {
        let first = self.state() == CacheState::Initializing;
        if !first {
            self.state.send_replace(CacheState::Refreshing);
        }

        let started = Instant::now();
        match self.load().await {
            Ok(snapshot) => {
                let duration = started.elapsed();
                self.metrics.emit(MetricSample::RefreshCompleted {
                    duration,
                    environments: snapshot.environment_count(),
                    features: snapshot.feature_count(),
                    segments: snapshot.segment_count(),
                });
                self.snapshot.store(Some(Arc::new(snapshot)));
                self.state.send_replace(CacheState::Ready);

                let event = if first {
                    info!("frontend API cache ready in {duration:?}");
                    CacheEvent::Ready { duration }
                } else {
                    debug!("frontend API cache updated in {duration:?}");
                    CacheEvent::Updated { duration }
                };
                let _ = self.events.send(event);
            }
            Err(err) => {
                self.metrics.emit(MetricSample::RefreshFailed {
                    duration: started.elapsed(),
                });
                if first {
                    error!("initial cache load failed, serving empty results until the next revision signal: {err}");
                } else {
                    error!("cache refresh failed, keeping the previous snapshot: {err}");
                    self.state.send_replace(CacheState::Ready);
                }
            }
        }
    }

    async fn load(&self) -> Result<CacheSnapshot, SourceError> {
        let segments = self.segments.get_all().await?;
        let features = self.toggles.get_all().await?;
        Ok(CacheSnapshot::build(features, segments))
    }
}

pub struct GlobalFrontendApiCacheBuilder {
    toggles: Arc<dyn ClientFeatureToggleReadModel>,
    segments: Arc<dyn SegmentReadModel>,
    revisions: broadcast::Receiver<()>,
    metrics: Arc<dyn MetricsSink>,
}

impl GlobalFrontendApiCacheBuilder {
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Spawns the refresh worker, which runs the initial load and then
    /// serves revision signals for the life of the process. Must be called
    /// from within a tokio runtime.
    pub fn build(self) -> Arc<GlobalFrontendApiCache> {
        let (state, _) = watch::channel(CacheState::Initializing);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let cache = Arc::new(GlobalFrontendApiCache {
            snapshot: ArcSwapOption::empty(),
            toggles: self.toggles,
            segments: self.segments,
            metrics: self.metrics,
            state,
            events,
        });
        Arc::clone(&cache).spawn_refresh_worker(self.revisions);
        cache
    }
}
