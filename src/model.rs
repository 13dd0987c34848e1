//! Tariff data model
//!
//! Types shared between search, fetching, mapping and the refresh
//! coordinator. Everything here is plain data; behaviour lives in the
//! modules that produce these values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source label surfaced with every result
pub const SOURCE_NAME: &str = "ElCom/LINDAS";

/// A municipality returned from search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityMatch {
    pub label: String,
    pub uri: String,
    /// Rank score in (0, 1], higher is better
    pub score: f64,
}

/// One numeric price fact fetched for a municipality/year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub subject_uri: String,
    pub predicate_uri: String,
    pub value: f64,
    /// Unit text or datatype as found in the graph
    pub unit: Option<String>,
    /// Tariff profile (e.g. "h4", "household")
    pub profile_tag: Option<String>,
}

impl Observation {
    pub fn new(subject_uri: &str, predicate_uri: &str, value: f64) -> Self {
        Self {
            subject_uri: subject_uri.to_string(),
            predicate_uri: predicate_uri.to_string(),
            value,
            unit: None,
            profile_tag: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile_tag = Some(profile.to_string());
        self
    }
}

/// Decomposed parts of an electricity tariff
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    Total,
    Energy,
    Grid,
    Fees,
    Metering,
}

impl PriceKind {
    pub const ALL: [PriceKind; 5] = [
        PriceKind::Total,
        PriceKind::Energy,
        PriceKind::Grid,
        PriceKind::Fees,
        PriceKind::Metering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Energy => "energy",
            Self::Grid => "grid",
            Self::Fees => "fees",
            Self::Metering => "metering",
        }
    }

    /// Friendly suffix used for sensor names
    pub fn label(&self) -> &'static str {
        match self {
            Self::Total => "Total Price",
            Self::Energy => "Energy Price",
            Self::Grid => "Grid Price",
            Self::Fees => "Fees Price",
            Self::Metering => "Metering Price",
        }
    }
}

/// Normalised unit of a price component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceUnit {
    #[serde(rename = "CHF/kWh")]
    ChfPerKwh,
    #[serde(rename = "CHF/month")]
    ChfPerMonth,
    #[serde(rename = "CHF/year")]
    ChfPerYear,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChfPerKwh => "CHF/kWh",
            Self::ChfPerMonth => "CHF/month",
            Self::ChfPerYear => "CHF/year",
            Self::Unknown => "unknown",
        }
    }
}

/// One resolved price per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComponent {
    pub kind: PriceKind,
    /// Non-negative, finite
    pub value: f64,
    pub unit: PriceUnit,
    pub source_observation_id: String,
}

/// At most one component per kind
pub type PriceComponents = BTreeMap<PriceKind, PriceComponent>;

/// Cached outcome of one successful refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffResult {
    pub municipality: MunicipalityMatch,
    pub year: i32,
    pub components: PriceComponents,
    pub raw_observation_ids: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl TariffResult {
    /// Result with every component absent (valid scope, no data)
    pub fn empty(municipality: MunicipalityMatch, year: i32, fetched_at: DateTime<Utc>) -> Self {
        Self {
            municipality,
            year,
            components: PriceComponents::new(),
            raw_observation_ids: Vec::new(),
            fetched_at,
        }
    }

    pub fn component(&self, kind: PriceKind) -> Option<&PriceComponent> {
        self.components.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Distinct observation ids in first-seen order, capped
pub fn capped_observation_ids(observations: &[Observation], cap: usize) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for obs in observations {
        if ids.len() >= cap {
            break;
        }
        if !ids.iter().any(|id| id == &obs.subject_uri) {
            ids.push(obs.subject_uri.clone());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_ordered_and_labelled() {
        let names: Vec<&str> = PriceKind::ALL.iter().map(PriceKind::as_str).collect();
        assert_eq!(names, vec!["total", "energy", "grid", "fees", "metering"]);
        assert_eq!(PriceKind::Metering.label(), "Metering Price");
    }

    #[test]
    fn unit_serializes_as_label() {
        let json = serde_json::to_string(&PriceUnit::ChfPerKwh).unwrap();
        assert_eq!(json, "\"CHF/kWh\"");
        let back: PriceUnit = serde_json::from_str("\"CHF/month\"").unwrap();
        assert_eq!(back, PriceUnit::ChfPerMonth);
    }

    #[test]
    fn capped_ids_are_distinct() {
        let obs = vec![
            Observation::new("o1", "p1", 1.0),
            Observation::new("o1", "p2", 2.0),
            Observation::new("o2", "p1", 3.0),
            Observation::new("o3", "p1", 4.0),
        ];
        assert_eq!(capped_observation_ids(&obs, 2), vec!["o1", "o2"]);
        assert_eq!(capped_observation_ids(&obs, 20).len(), 3);
    }
}
