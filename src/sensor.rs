//! Result surface
//!
//! Turns the cached [`TariffResult`] of an entity into five named readings
//! plus shared attributes, the shape a host sensor registry consumes.

use chrono::SecondsFormat;
use serde::{Serialize, Serializer};

use crate::config::EntityConfig;
use crate::coordinator::{CoordinatorHandle, RefreshStatus};
use crate::model::{PriceKind, SOURCE_NAME, TariffResult};

/// Name prefix used when the entity carries no municipality label
pub const FALLBACK_NAME: &str = "Swiss Electricity Tariffs (ElCom/LINDAS)";

/// Reading state: a number, or the literal `unavailable`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorState {
    Value(f64),
    Unavailable,
}

impl SensorState {
    pub fn value(&self) -> Option<f64> {
        match self {
            SensorState::Value(v) => Some(*v),
            SensorState::Unavailable => None,
        }
    }
}

impl Serialize for SensorState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SensorState::Value(v) => serializer.serialize_f64(*v),
            SensorState::Unavailable => serializer.serialize_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub key: String,
    /// Stable across renames of the label: `<municipality uri>|<kind>`
    pub unique_id: String,
    pub name: String,
    pub state: SensorState,
    pub unit: Option<String>,
    pub source_observation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportAttributes {
    pub municipality_label: String,
    pub municipality_uri: String,
    pub year: i32,
    pub source: String,
    /// ISO-8601 UTC with seconds precision
    pub last_update: Option<String>,
    pub raw_observation_ids: Vec<String>,
}

/// Everything the host needs to show one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffReport {
    pub entity_id: String,
    pub readings: Vec<SensorReading>,
    pub attributes: ReportAttributes,
    pub status: RefreshStatus,
}

impl TariffReport {
    pub fn reading(&self, kind: PriceKind) -> Option<&SensorReading> {
        self.readings.iter().find(|r| r.key == kind.as_str())
    }
}

/// Render the report for an entity from its cached result
pub fn render(
    entity: &EntityConfig,
    result: Option<&TariffResult>,
    status: &RefreshStatus,
) -> TariffReport {
    let prefix = if entity.municipality_label.trim().is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        format!("Swiss Tariff {}", entity.municipality_label.trim())
    };

    let readings = PriceKind::ALL
        .iter()
        .map(|&kind| {
            let component = result.and_then(|r| r.component(kind));
            SensorReading {
                key: kind.as_str().to_string(),
                unique_id: format!("{}|{}", entity.municipality_uri, kind.as_str()),
                name: format!("{} {}", prefix, kind.label()),
                state: component.map_or(SensorState::Unavailable, |c| SensorState::Value(c.value)),
                unit: component.map(|c| c.unit.as_str().to_string()),
                source_observation_id: component.map(|c| c.source_observation_id.clone()),
            }
        })
        .collect();

    let attributes = match result {
        Some(r) => ReportAttributes {
            municipality_label: r.municipality.label.clone(),
            municipality_uri: r.municipality.uri.clone(),
            year: r.year,
            source: SOURCE_NAME.to_string(),
            last_update: Some(r.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            raw_observation_ids: r.raw_observation_ids.clone(),
        },
        None => ReportAttributes {
            municipality_label: entity.display_label().to_string(),
            municipality_uri: entity.municipality_uri.clone(),
            year: entity.year,
            source: SOURCE_NAME.to_string(),
            last_update: None,
            raw_observation_ids: Vec::new(),
        },
    };

    TariffReport {
        entity_id: entity.id.clone(),
        readings,
        attributes,
        status: status.clone(),
    }
}

/// Report from the current state of a running coordinator
pub fn current_report(handle: &CoordinatorHandle) -> TariffReport {
    let snapshot = handle.snapshot();
    render(&handle.entity(), snapshot.as_deref(), &handle.status())
}
