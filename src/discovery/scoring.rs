use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TariffError};
use crate::sparql::Term;
use crate::sparql::types::is_integer_datatype;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const MUNICIPALITY_HINTS: &[&str] = &["municip", "gemeinde", "commune", "comune"];
const YEAR_HINTS: &[&str] = &["year", "jahr", "period", "annee"];
const PRICE_HINTS: &[&str] = &[
    "price", "preis", "tarif", "chf", "kwh", "total", "energy", "energie", "grid", "netz", "fee",
    "abgabe", "charge", "meter", "messung",
];

const EVIDENCE_WEIGHT: f64 = 0.75;
const HINT_WEIGHT: f64 = 0.25;
const PRICE_CEILING: f64 = 10_000.0;

/// Role a predicate plays in the observation cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateRole {
    MunicipalityLink,
    Year,
    PriceComponent,
    Unknown,
}

/// Scored predicate seen in the sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateCandidate {
    pub predicate_uri: String,
    pub role: PredicateRole,
    /// Within [0, 1]
    pub confidence: f64,
    pub sample_count: usize,
}

/// Predicates resolved for one municipality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSchema {
    pub municipality_predicate: String,
    pub year_predicate: String,
    /// Sorted, may be empty
    pub price_predicates: Vec<String>,
    /// Every scored predicate, sorted by URI
    pub candidates: Vec<PredicateCandidate>,
}

impl DiscoveredSchema {
    pub fn is_price_predicate(&self, predicate: &str) -> bool {
        self.price_predicates
            .binary_search_by(|p| p.as_str().cmp(predicate))
            .is_ok()
    }
}

/// One sampled `(observation, predicate, object)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTriple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
    /// Label of the object when it is a labelled resource
    pub object_label: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Signals {
    samples: usize,
    target_hits: usize,
    labelled_uris: usize,
    uris: usize,
    year_like: usize,
    price_like: f64,
}

impl Signals {
    fn observe(&mut self, triple: &SampledTriple, target: &str) {
        self.samples += 1;
        match &triple.object {
            Term::Uri(uri) => {
                self.uris += 1;
                if triple.object_label.is_some() {
                    self.labelled_uris += 1;
                }
                if uri == target {
                    self.target_hits += 1;
                }
            }
            term if is_year_like(term) => self.year_like += 1,
            term => self.price_like += price_weight(term),
        }
    }

    fn confidence(&self, role: PredicateRole, hint: bool) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let n = self.samples as f64;
        let evidence = match role {
            PredicateRole::MunicipalityLink => {
                0.6 * self.target_hits as f64 / n
                    + 0.25 * self.labelled_uris as f64 / n
                    + 0.15 * self.uris as f64 / n
            }
            PredicateRole::Year => self.year_like as f64 / n,
            PredicateRole::PriceComponent => self.price_like / n,
            PredicateRole::Unknown => 0.0,
        };
        let hint = if hint { 1.0 } else { 0.0 };
        (EVIDENCE_WEIGHT * evidence + HINT_WEIGHT * hint).clamp(0.0, 1.0)
    }
}

/// Integer (or gYear) literal in 2000..=2100, or a bare four-digit string
fn is_year_like(term: &Term) -> bool {
    match term {
        Term::Numeric {
            value, datatype, ..
        } => is_integer_datatype(datatype) && value.fract() == 0.0 && (2000.0..=2100.0).contains(value),
        Term::Literal {
            value,
            datatype: None,
            ..
        } => {
            let v = value.trim();
            v.len() == 4
                && v.chars().all(|c| c.is_ascii_digit())
                && v.parse::<i32>().is_ok_and(|y| (2000..=2100).contains(&y))
        }
        _ => false,
    }
}

/// Price plausibility of a non-year literal; decimals and unit-typed values weigh more
fn price_weight(term: &Term) -> f64 {
    match term {
        Term::Numeric {
            value, datatype, ..
        } if (0.0..=PRICE_CEILING).contains(value) => {
            if is_integer_datatype(datatype) { 0.6 } else { 1.0 }
        }
        Term::Literal {
            value,
            datatype: Some(_),
            ..
        } => match value.trim().parse::<f64>() {
            // numeric lexical with a non-XSD (unit) datatype
            Ok(v) if (0.0..=PRICE_CEILING).contains(&v) => 1.0,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

fn has_hint(predicate: &str, hints: &[&str]) -> bool {
    let name = crate::sparql::local_name(predicate).to_lowercase();
    hints.iter().any(|h| name.contains(h))
}

/// Score every sampled predicate and pick one role each
pub fn score_predicates(
    samples: &[SampledTriple],
    target_municipality: &str,
    min_confidence: f64,
) -> Vec<PredicateCandidate> {
    let mut signals: BTreeMap<&str, Signals> = BTreeMap::new();
    for triple in samples.iter().filter(|t| t.predicate != RDF_TYPE) {
        signals
            .entry(triple.predicate.as_str())
            .or_default()
            .observe(triple, target_municipality);
    }

    signals
        .into_iter()
        .map(|(predicate, s)| {
            let scored = [
                (
                    PredicateRole::MunicipalityLink,
                    s.confidence(
                        PredicateRole::MunicipalityLink,
                        has_hint(predicate, MUNICIPALITY_HINTS),
                    ),
                ),
                (
                    PredicateRole::Year,
                    s.confidence(PredicateRole::Year, has_hint(predicate, YEAR_HINTS)),
                ),
                (
                    PredicateRole::PriceComponent,
                    s.confidence(
                        PredicateRole::PriceComponent,
                        has_hint(predicate, PRICE_HINTS),
                    ),
                ),
            ];
            // strict > keeps the earlier role on ties
            let (mut role, confidence) = scored
                .into_iter()
                .fold((PredicateRole::Unknown, 0.0_f64), |best, cur| {
                    if cur.1 > best.1 { cur } else { best }
                });
            if confidence < min_confidence || confidence == 0.0 {
                role = PredicateRole::Unknown;
            }
            PredicateCandidate {
                predicate_uri: predicate.to_string(),
                role,
                confidence,
                sample_count: s.samples,
            }
        })
        .collect()
}

/// Highest confidence, then most samples, then lexical predicate URI
fn rank(a: &PredicateCandidate, b: &PredicateCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.sample_count.cmp(&a.sample_count))
        .then_with(|| a.predicate_uri.cmp(&b.predicate_uri))
}

fn winner(candidates: &[PredicateCandidate], role: PredicateRole) -> Option<&PredicateCandidate> {
    candidates
        .iter()
        .filter(|c| c.role == role)
        .min_by(|a, b| rank(a, b))
}

fn missing_role(role: &str, min_confidence: f64, predicates: usize, samples: usize) -> TariffError {
    TariffError::schema_discovery(format!(
        "no {} predicate reached confidence {:.2} ({} predicates, {} samples)",
        role, min_confidence, predicates, samples
    ))
}

/// Resolve the municipality, year and price predicates from sampled triples
pub fn resolve(
    samples: &[SampledTriple],
    target_municipality: &str,
    min_confidence: f64,
) -> Result<DiscoveredSchema> {
    let candidates = score_predicates(samples, target_municipality, min_confidence);

    let municipality_predicate = winner(&candidates, PredicateRole::MunicipalityLink)
        .map(|c| c.predicate_uri.clone())
        .ok_or_else(|| missing_role("municipality", min_confidence, candidates.len(), samples.len()))?;
    let year_predicate = winner(&candidates, PredicateRole::Year)
        .map(|c| c.predicate_uri.clone())
        .ok_or_else(|| missing_role("year", min_confidence, candidates.len(), samples.len()))?;

    let price_predicates: Vec<String> = candidates
        .iter()
        .filter(|c| c.role == PredicateRole::PriceComponent)
        .map(|c| c.predicate_uri.clone())
        .collect();

    Ok(DiscoveredSchema {
        municipality_predicate,
        year_predicate,
        price_predicates,
        candidates,
    })
}
