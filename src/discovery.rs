//! Predicate discovery
//!
//! Samples observation triples around a municipality and infers which
//! predicates link the municipality, carry the year and hold prices. The
//! scoring itself lives in [`scoring`] as a pure function over sampled
//! triples; this module only gathers the sample.

use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::sparql::{GraphBinding, SparqlClient, iri_ref};

pub mod scoring;

pub use scoring::{
    DiscoveredSchema, PredicateCandidate, PredicateRole, SampledTriple, resolve, score_predicates,
};

const PREFIXES: &str = "PREFIX cube: <https://cube.link/>\n\
                        PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
                        PREFIX schema: <http://schema.org/>\n";

/// Where the sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleScope {
    /// Observations referencing the target municipality and year
    Scoped,
    /// Any observations of the dataset
    Bootstrap,
}

/// Samples the graph and resolves predicate roles
#[derive(Clone)]
pub struct PredicateDiscovery {
    client: SparqlClient,
    sample_limit: u32,
    min_confidence: f64,
    logger: StructuredLogger,
}

impl PredicateDiscovery {
    pub fn new(client: SparqlClient, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            sample_limit: config.sample_limit.max(1),
            min_confidence: config.min_confidence,
            logger: get_logger_with_context(LogContext::new("discovery")),
        }
    }

    /// Resolve the schema for `municipality_uri` in `year`
    pub async fn discover(&self, municipality_uri: &str, year: i32) -> Result<DiscoveredSchema> {
        let (scope, samples) = self.sample(municipality_uri, year).await?;
        let schema = resolve(&samples, municipality_uri, self.min_confidence).inspect_err(|e| {
            self.logger.warn(&format!(
                "Discovery failed (scope={:?}, samples={}): {}",
                scope,
                samples.len(),
                e
            ));
        })?;

        self.logger.info(&format!(
            "Resolved schema (scope={:?}, samples={}, municipality={}, year={}, price_predicates={})",
            scope,
            samples.len(),
            schema.municipality_predicate,
            schema.year_predicate,
            schema.price_predicates.len()
        ));
        for candidate in &schema.candidates {
            self.logger.debug(&format!(
                "candidate {} role={:?} confidence={:.3} samples={}",
                candidate.predicate_uri,
                candidate.role,
                candidate.confidence,
                candidate.sample_count
            ));
        }
        Ok(schema)
    }

    /// Scoped sample, falling back to a dataset-wide bootstrap sample
    pub async fn sample(
        &self,
        municipality_uri: &str,
        year: i32,
    ) -> Result<(SampleScope, Vec<SampledTriple>)> {
        let scoped = self.scoped_query(municipality_uri, year)?;
        let rows = self.client.execute(&scoped).await?;
        let samples = to_samples(&rows);
        if !samples.is_empty() {
            return Ok((SampleScope::Scoped, samples));
        }

        self.logger.debug(&format!(
            "Scoped sample empty (query_bytes={}), bootstrapping",
            scoped.len()
        ));
        let rows = self.client.execute(&self.bootstrap_query()).await?;
        Ok((SampleScope::Bootstrap, to_samples(&rows)))
    }

    fn observation_limit(&self) -> u32 {
        (self.sample_limit / 10).max(5)
    }

    fn scoped_query(&self, municipality_uri: &str, year: i32) -> Result<String> {
        Ok(format!(
            "{prefixes}SELECT ?obs ?p ?o (SAMPLE(?l) AS ?olabel)\n\
             {from}WHERE {{\n\
             \x20 {{\n\
             \x20   SELECT DISTINCT ?obs WHERE {{\n\
             \x20     ?obs a cube:Observation ; ?mp {muni} ; ?yp ?yv .\n\
             \x20     FILTER(SUBSTR(STR(?yv), 1, 4) = \"{year:04}\")\n\
             \x20   }}\n\
             \x20   LIMIT {obs_limit}\n\
             \x20 }}\n\
             \x20 ?obs ?p ?o .\n\
             \x20 OPTIONAL {{ ?o (rdfs:label|schema:name) ?l . }}\n\
             }}\n\
             GROUP BY ?obs ?p ?o\n\
             LIMIT {limit}\n",
            prefixes = PREFIXES,
            from = self.client.from_clause(),
            muni = iri_ref(municipality_uri)?,
            obs_limit = self.observation_limit(),
            limit = self.sample_limit,
        ))
    }

    fn bootstrap_query(&self) -> String {
        format!(
            "{prefixes}SELECT ?obs ?p ?o (SAMPLE(?l) AS ?olabel)\n\
             {from}WHERE {{\n\
             \x20 {{ SELECT ?obs WHERE {{ ?obs a cube:Observation . }} LIMIT {obs_limit} }}\n\
             \x20 ?obs ?p ?o .\n\
             \x20 OPTIONAL {{ ?o (rdfs:label|schema:name) ?l . }}\n\
             }}\n\
             GROUP BY ?obs ?p ?o\n\
             LIMIT {limit}\n",
            prefixes = PREFIXES,
            from = self.client.from_clause(),
            obs_limit = self.observation_limit(),
            limit = self.sample_limit,
        )
    }
}

fn to_samples(rows: &[GraphBinding]) -> Vec<SampledTriple> {
    rows.iter()
        .filter_map(|row| {
            Some(SampledTriple {
                subject: row.text("obs")?.to_string(),
                predicate: row.uri("p")?.to_string(),
                object: row.get("o")?.clone(),
                object_label: row.text("olabel").map(str::to_string),
            })
        })
        .collect()
}
