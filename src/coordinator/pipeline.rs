use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::{Config, EntityConfig};
use crate::discovery::{DiscoveredSchema, PredicateDiscovery};
use crate::error::{Result, TariffError};
use crate::fetcher::ObservationFetcher;
use crate::logging::{LogContext, get_logger_with_context};
use crate::mapper::PriceMapper;
use crate::model::{MunicipalityMatch, TariffResult, capped_observation_ids};
use crate::sparql::SparqlClient;

/// Discovered schema kept across cycles of one entity
#[derive(Debug, Clone)]
pub struct SchemaCache {
    municipality_uri: String,
    schema: Arc<DiscoveredSchema>,
    stored_at: Instant,
}

impl SchemaCache {
    pub fn schema(&self) -> &DiscoveredSchema {
        &self.schema
    }
}

/// Discovery, fetch and mapping for one entity
#[derive(Clone)]
pub struct TariffPipeline {
    discovery: PredicateDiscovery,
    fetcher: ObservationFetcher,
    mapper: PriceMapper,
    raw_observation_cap: usize,
    schema_ttl: Option<Duration>,
}

impl TariffPipeline {
    pub fn new(client: SparqlClient, config: &Config) -> Self {
        let ttl_hours = u64::from(config.discovery.schema_cache_hours);
        Self {
            discovery: PredicateDiscovery::new(client.clone(), &config.discovery),
            fetcher: ObservationFetcher::new(client, &config.discovery),
            mapper: PriceMapper::new(&config.profile_priority),
            raw_observation_cap: config.refresh.raw_observation_cap,
            schema_ttl: (ttl_hours > 0).then(|| Duration::from_secs(ttl_hours * 3600)),
        }
    }

    /// One refresh cycle without a schema cache
    pub async fn refresh_once(&self, entity: &EntityConfig) -> Result<TariffResult> {
        let mut cache = None;
        self.run(entity, &mut cache).await
    }

    /// One refresh cycle; `NoData` when the scope has no observations
    pub async fn run(
        &self,
        entity: &EntityConfig,
        cache: &mut Option<SchemaCache>,
    ) -> Result<TariffResult> {
        let logger = get_logger_with_context(
            LogContext::new("pipeline")
                .with_entity(&entity.id)
                .with_field("year", entity.year.to_string()),
        );

        let cached = self.cached_schema(entity, cache);
        let from_cache = cached.is_some();
        let schema = match cached {
            Some(schema) => schema,
            None => self.discover(entity, cache).await?,
        };

        let mut observations = self
            .fetcher
            .fetch(&entity.municipality_uri, entity.year, &schema)
            .await?;

        if observations.is_empty() && from_cache {
            logger.info("Cached schema produced no observations, rediscovering");
            *cache = None;
            let schema = self.discover(entity, cache).await?;
            observations = self
                .fetcher
                .fetch(&entity.municipality_uri, entity.year, &schema)
                .await?;
        }

        if observations.is_empty() {
            return Err(TariffError::no_data(
                entity.municipality_uri.clone(),
                entity.year,
            ));
        }

        let outcome = self.mapper.map_detailed(&observations);
        logger.info(&format!(
            "Mapped {} components from {} observations (set_aside={}, rejected={})",
            outcome.components.len(),
            observations.len(),
            outcome.set_aside.len(),
            outcome.rejected
        ));

        Ok(TariffResult {
            municipality: municipality_of(entity),
            year: entity.year,
            components: outcome.components,
            raw_observation_ids: capped_observation_ids(&observations, self.raw_observation_cap),
            fetched_at: Utc::now(),
        })
    }

    fn cached_schema(
        &self,
        entity: &EntityConfig,
        cache: &Option<SchemaCache>,
    ) -> Option<Arc<DiscoveredSchema>> {
        let ttl = self.schema_ttl?;
        cache
            .as_ref()
            .filter(|c| c.municipality_uri == entity.municipality_uri)
            .filter(|c| c.stored_at.elapsed() < ttl)
            .map(|c| c.schema.clone())
    }

    async fn discover(
        &self,
        entity: &EntityConfig,
        cache: &mut Option<SchemaCache>,
    ) -> Result<Arc<DiscoveredSchema>> {
        let schema = Arc::new(
            self.discovery
                .discover(&entity.municipality_uri, entity.year)
                .await?,
        );
        if self.schema_ttl.is_some() {
            *cache = Some(SchemaCache {
                municipality_uri: entity.municipality_uri.clone(),
                schema: schema.clone(),
                stored_at: Instant::now(),
            });
        }
        Ok(schema)
    }
}

/// Municipality reference for a configured entity
pub fn municipality_of(entity: &EntityConfig) -> MunicipalityMatch {
    MunicipalityMatch {
        label: entity.display_label().to_string(),
        uri: entity.municipality_uri.clone(),
        score: 1.0,
    }
}
