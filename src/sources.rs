use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::feature::{FeatureToggleClient, Segment};

/// Toggles of one environment, keyed by feature name.
pub type EnvironmentFeatures = BTreeMap<String, FeatureToggleClient>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data access error: {0}")]
    DataAccess(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the full set of segment definitions.
#[async_trait]
pub trait SegmentReadModel: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Segment>, SourceError>;
}

/// Supplies, per environment, the full set of feature toggle definitions.
#[async_trait]
pub trait ClientFeatureToggleReadModel: Send + Sync {
    async fn get_all(&self) -> Result<BTreeMap<String, EnvironmentFeatures>, SourceError>;
}
