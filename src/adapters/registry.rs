//! Adapter registry.
//!
//! Maps active sources to adapter instances for one ingestion run. The
//! registry is built fresh per run and injected into the orchestrator;
//! nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::adapters::{JsonApiAdapter, SourceAdapter, SpreadsheetAdapter};
use crate::models::{source, SourceType};
use crate::normalize::CityMatcher;

pub struct AdapterRegistry {
    adapters: HashMap<i32, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Build adapters for every fetchable source. Manual-entry sources have
    /// no adapter; their records enter through the import endpoint and wait
    /// in the candidate queue.
    pub fn build(
        sources: &[source::Model],
        matcher: Arc<CityMatcher>,
        client: reqwest::Client,
    ) -> Self {
        let mut adapters: HashMap<i32, Arc<dyn SourceAdapter>> = HashMap::new();

        for source in sources {
            let Some(source_type) = source.source_type() else {
                warn!(source = %source.name, kind = %source.source_type, "unknown source type, skipping");
                continue;
            };

            match source_type {
                SourceType::Manual => continue,
                SourceType::Api | SourceType::Scraper => {
                    let Some(endpoint) = source.endpoint.clone() else {
                        warn!(source = %source.name, "fetchable source without endpoint, skipping");
                        continue;
                    };
                    adapters.insert(
                        source.id,
                        Arc::new(JsonApiAdapter::new(
                            client.clone(),
                            endpoint,
                            matcher.clone(),
                        )),
                    );
                }
                SourceType::Spreadsheet => {
                    let Some(endpoint) = source.endpoint.clone() else {
                        warn!(source = %source.name, "spreadsheet source without endpoint, skipping");
                        continue;
                    };
                    adapters.insert(
                        source.id,
                        Arc::new(SpreadsheetAdapter::new(
                            client.clone(),
                            endpoint,
                            matcher.clone(),
                        )),
                    );
                }
            }
        }

        Self { adapters }
    }

    /// Registry over explicit adapters, used by tests to inject doubles.
    pub fn from_adapters(adapters: HashMap<i32, Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, source_id: i32) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
