//! Observation fetcher
//!
//! Pulls every triple of the observations scoped by the discovered
//! municipality and year predicates, then turns numeric price facts into
//! [`Observation`]s. Sibling triples of the same observation supply the
//! unit and tariff profile.

use std::collections::BTreeMap;

use crate::config::DiscoveryConfig;
use crate::discovery::DiscoveredSchema;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::model::Observation;
use crate::sparql::types::XSD;
use crate::sparql::{GraphBinding, SparqlClient, Term, iri_ref, local_name};

const UNIT_PREDICATE_HINTS: &[&str] = &["unit", "einheit", "currency", "waehrung"];
const UNIT_TEXT_HINTS: &[&str] = &["chf", "rp", "rappen", "kwh", "month", "monat", "year", "jahr"];
const PROFILE_PREDICATE_HINTS: &[&str] = &["category", "kategorie", "profile", "profil", "consumer"];

/// Longest literal still considered a unit label
const MAX_UNIT_TEXT: usize = 32;

/// Fetches observations for one municipality and year
#[derive(Clone)]
pub struct ObservationFetcher {
    client: SparqlClient,
    fetch_limit: u32,
    logger: StructuredLogger,
}

#[derive(Debug, Clone)]
struct Sibling {
    predicate: String,
    object: Term,
    label: Option<String>,
}

impl ObservationFetcher {
    pub fn new(client: SparqlClient, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            fetch_limit: config.fetch_limit.max(1),
            logger: get_logger("fetcher"),
        }
    }

    /// Fetch price observations; an empty result is not an error
    pub async fn fetch(
        &self,
        municipality_uri: &str,
        year: i32,
        schema: &DiscoveredSchema,
    ) -> Result<Vec<Observation>> {
        let query = self.build_query(municipality_uri, year, schema)?;
        let rows = self.client.execute(&query).await?;
        let observations = build_observations(&rows, schema);

        self.logger.debug(&format!(
            "Fetched observations (query_bytes={}, rows={}, observations={})",
            query.len(),
            rows.len(),
            observations.len()
        ));
        if rows.len() >= self.fetch_limit as usize {
            self.logger.warn(&format!(
                "Observation query hit fetch_limit={}, result may be truncated",
                self.fetch_limit
            ));
        }
        Ok(observations)
    }

    fn build_query(
        &self,
        municipality_uri: &str,
        year: i32,
        schema: &DiscoveredSchema,
    ) -> Result<String> {
        Ok(format!(
            "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
             PREFIX schema: <http://schema.org/>\n\
             SELECT ?obs ?p ?o (SAMPLE(?l) AS ?olabel)\n\
             {from}WHERE {{\n\
             \x20 ?obs {mp} {muni} ;\n\
             \x20      {yp} ?y .\n\
             \x20 FILTER(SUBSTR(STR(?y), 1, 4) = \"{year:04}\")\n\
             \x20 ?obs ?p ?o .\n\
             \x20 OPTIONAL {{ ?o (rdfs:label|schema:name) ?l . }}\n\
             }}\n\
             GROUP BY ?obs ?p ?o\n\
             ORDER BY ?obs ?p\n\
             LIMIT {limit}\n",
            from = self.client.from_clause(),
            mp = iri_ref(&schema.municipality_predicate)?,
            muni = iri_ref(municipality_uri)?,
            yp = iri_ref(&schema.year_predicate)?,
            limit = self.fetch_limit,
        ))
    }
}

/// Build observations from fetched triples grouped by subject
pub fn build_observations(rows: &[GraphBinding], schema: &DiscoveredSchema) -> Vec<Observation> {
    let mut by_subject: BTreeMap<&str, Vec<Sibling>> = BTreeMap::new();
    for row in rows {
        let (Some(subject), Some(predicate), Some(object)) =
            (row.text("obs"), row.uri("p"), row.get("o"))
        else {
            continue;
        };
        by_subject.entry(subject).or_default().push(Sibling {
            predicate: predicate.to_string(),
            object: object.clone(),
            label: row.text("olabel").map(str::to_string),
        });
    }

    let any_price = !schema.price_predicates.is_empty();
    let mut observations = Vec::new();
    for (subject, siblings) in &by_subject {
        let unit_hint = unit_hint(siblings);
        let profile = profile_tag(siblings);

        for sibling in siblings {
            let offered = if any_price {
                schema.is_price_predicate(&sibling.predicate)
            } else {
                sibling.predicate != schema.year_predicate
                    && sibling.predicate != schema.municipality_predicate
            };
            if !offered {
                continue;
            }
            let Some((value, typed_unit)) = numeric_value(&sibling.object) else {
                continue;
            };
            observations.push(Observation {
                subject_uri: subject.to_string(),
                predicate_uri: sibling.predicate.clone(),
                value,
                unit: typed_unit.or_else(|| unit_hint.clone()),
                profile_tag: profile.clone(),
            });
        }
    }
    observations
}

/// Numeric value plus a unit when the datatype is not plain XSD
fn numeric_value(term: &Term) -> Option<(f64, Option<String>)> {
    match term {
        Term::Numeric { value, .. } => Some((*value, None)),
        Term::Literal {
            value,
            datatype: Some(dt),
            ..
        } if !dt.starts_with(XSD) => {
            let v = value.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some((v, Some(dt.clone())))
        }
        _ => None,
    }
}

fn predicate_hinted(predicate: &str, hints: &[&str]) -> bool {
    let name = local_name(predicate).to_lowercase();
    hints.iter().any(|h| name.contains(h))
}

fn display_text(sibling: &Sibling) -> String {
    match (&sibling.label, &sibling.object) {
        (Some(label), _) => label.clone(),
        (None, Term::Uri(uri)) => local_name(uri).to_string(),
        (None, term) => term.lexical().to_string(),
    }
}

fn unit_hint(siblings: &[Sibling]) -> Option<String> {
    if let Some(s) = siblings
        .iter()
        .find(|s| predicate_hinted(&s.predicate, UNIT_PREDICATE_HINTS))
    {
        return Some(display_text(s));
    }
    siblings
        .iter()
        .filter(|s| matches!(s.object, Term::Literal { .. }))
        .map(|s| s.object.lexical())
        .find(|text| {
            let lower = text.to_lowercase();
            text.len() <= MAX_UNIT_TEXT
                && lower
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|token| UNIT_TEXT_HINTS.contains(&token))
        })
        .map(str::to_string)
}

fn profile_tag(siblings: &[Sibling]) -> Option<String> {
    siblings
        .iter()
        .find(|s| predicate_hinted(&s.predicate, PROFILE_PREDICATE_HINTS))
        .map(|s| match &s.object {
            // codes such as H4 come from the IRI, not the (verbose) label
            Term::Uri(uri) => local_name(uri).to_lowercase(),
            _ => display_text(s).trim().to_lowercase(),
        })
        .filter(|tag| !tag.is_empty())
}
