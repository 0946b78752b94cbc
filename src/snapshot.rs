use std::collections::BTreeMap;

use crate::feature::{FeatureToggleClient, Segment};
use crate::sources::EnvironmentFeatures;
use crate::ToggleQuery;

/// The point-in-time view published by the cache. Immutable after
/// construction; a refresh builds a new snapshot rather than touching a
/// published one.
///
/// Both maps are BTreeMaps so iteration order is stable: query results come
/// out sorted by feature name, and the wildcard-environment merge resolves
/// duplicates in lexicographic environment order.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    features_by_environment: BTreeMap<String, EnvironmentFeatures>,
    segments_by_id: BTreeMap<i32, Segment>,
}

impl CacheSnapshot {
    pub fn build(
        features_by_environment: BTreeMap<String, EnvironmentFeatures>,
        segments: Vec<Segment>,
    ) -> Self {
        let segments_by_id = segments.into_iter().map(|s| (s.id, s)).collect();
        Self {
            features_by_environment,
            segments_by_id,
        }
    }

    pub fn segment(&self, id: i32) -> Option<&Segment> {
        self.segments_by_id.get(&id)
    }

    pub fn toggle(&self, name: &str, query: &ToggleQuery) -> Option<&FeatureToggleClient> {
        let toggle = if query.wants_all_environments() {
            // Same winner as the merge in `toggles`: the lexicographically
            // last environment containing the name.
            self.features_by_environment
                .values()
                .filter_map(|features| features.get(name))
                .last()?
        } else {
            self.features_by_environment
                .get(&query.environment)?
                .get(name)?
        };

        query.allows_project(&toggle.project).then_some(toggle)
    }

    pub fn toggles(&self, query: &ToggleQuery) -> Vec<&FeatureToggleClient> {
        if query.wants_all_environments() {
            let mut merged: BTreeMap<&str, &FeatureToggleClient> = BTreeMap::new();
            for features in self.features_by_environment.values() {
                for toggle in features.values() {
                    merged.insert(toggle.name.as_str(), toggle);
                }
            }
            merged
                .into_values()
                .filter(|toggle| query.allows_project(&toggle.project))
                .collect()
        } else {
            self.features_by_environment
                .get(&query.environment)
                .map(|features| {
                    features
                        .values()
                        .filter(|toggle| query.allows_project(&toggle.project))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    pub fn environment_count(&self) -> usize {
        self.features_by_environment.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features_by_environment.values().map(BTreeMap::len).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments_by_id.len()
    }
}
