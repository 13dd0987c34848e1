//! Price mapper
//!
//! Classifies observations into price kinds by predicate keywords,
//! normalises units and picks exactly one observation per kind. The pick
//! depends only on the declared profile priority and the observations'
//! own content, never on their order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::logging::{StructuredLogger, get_logger};
use crate::model::{Observation, PriceComponent, PriceComponents, PriceKind, PriceUnit};

pub mod keywords;
pub mod units;

use units::{UnitHint, implied_rate_unit, normalize, parse_unit};

/// An observation that classified to a kind but lost the selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetAside {
    pub kind: PriceKind,
    pub observation: Observation,
    pub chosen_observation_id: String,
}

/// Full mapping result including the alternatives that were not chosen
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingOutcome {
    pub components: PriceComponents,
    pub set_aside: Vec<SetAside>,
    /// Observations dropped for an implausible magnitude
    pub rejected: usize,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    observation: &'a Observation,
    kind: PriceKind,
    keyword_score: usize,
    value: f64,
    unit: PriceUnit,
    explicit_kwh: bool,
    profile: ProfileRank,
}

/// Position of a profile tag in the declared priority
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ProfileRank {
    Listed(usize),
    Untagged,
    Other(String),
}

/// Deterministic price mapper driven by a profile priority list
#[derive(Debug, Clone)]
pub struct PriceMapper {
    priority: Vec<String>,
    logger: StructuredLogger,
}

impl PriceMapper {
    pub fn new<S: AsRef<str>>(priority: &[S]) -> Self {
        Self {
            priority: priority
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .collect(),
            logger: get_logger("mapper"),
        }
    }

    /// One component per kind; kinds without a usable observation are absent
    pub fn map(&self, observations: &[Observation]) -> PriceComponents {
        self.map_detailed(observations).components
    }

    pub fn map_detailed(&self, observations: &[Observation]) -> MappingOutcome {
        let mut by_kind: BTreeMap<PriceKind, Vec<Candidate<'_>>> = BTreeMap::new();
        let mut rejected = 0;

        let classified: Vec<_> = observations
            .iter()
            .filter_map(|observation| {
                let (kind, keyword_score) = keywords::classify(&observation.predicate_uri)?;
                Some((observation, kind, keyword_score, parse_unit(observation.unit.as_deref())))
            })
            .collect();

        // unit-less rates of one observation share a single implied unit
        let mut unitless_rates: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for &(observation, kind, _, hint) in &classified {
            if hint == UnitHint::Missing && kind != PriceKind::Metering {
                unitless_rates
                    .entry(observation.subject_uri.as_str())
                    .or_default()
                    .push(observation.value);
            }
        }
        let implied: BTreeMap<&str, UnitHint> = unitless_rates
            .into_iter()
            .map(|(subject, values)| (subject, implied_rate_unit(values)))
            .collect();

        for (observation, kind, keyword_score, hint) in classified {
            let effective = match implied.get(observation.subject_uri.as_str()) {
                Some(&unit) if hint == UnitHint::Missing && kind != PriceKind::Metering => unit,
                _ => hint,
            };
            let Some((value, unit)) = normalize(kind, observation.value, effective) else {
                rejected += 1;
                self.logger.debug(&format!(
                    "Rejected {} observation {} (value={}, unit={:?})",
                    kind.as_str(),
                    observation.subject_uri,
                    observation.value,
                    observation.unit
                ));
                continue;
            };
            by_kind.entry(kind).or_default().push(Candidate {
                observation,
                kind,
                keyword_score,
                value,
                unit,
                explicit_kwh: hint.is_per_kwh(),
                profile: self.profile_rank(observation.profile_tag.as_deref()),
            });
        }

        let mut outcome = MappingOutcome {
            rejected,
            ..MappingOutcome::default()
        };
        for (kind, mut candidates) in by_kind {
            candidates.sort_by(compare_candidates);
            let mut iter = candidates.into_iter();
            let Some(chosen) = iter.next() else {
                continue;
            };
            for alternative in iter {
                self.logger.debug(&format!(
                    "Set aside {} alternative {} (profile={}, value={}) in favour of {} (profile={}, value={})",
                    kind.as_str(),
                    alternative.observation.subject_uri,
                    alternative.observation.profile_tag.as_deref().unwrap_or("-"),
                    alternative.value,
                    chosen.observation.subject_uri,
                    chosen.observation.profile_tag.as_deref().unwrap_or("-"),
                    chosen.value
                ));
                outcome.set_aside.push(SetAside {
                    kind,
                    observation: alternative.observation.clone(),
                    chosen_observation_id: chosen.observation.subject_uri.clone(),
                });
            }
            outcome.components.insert(
                kind,
                PriceComponent {
                    kind: chosen.kind,
                    value: chosen.value,
                    unit: chosen.unit,
                    source_observation_id: chosen.observation.subject_uri.clone(),
                },
            );
        }
        outcome
    }

    fn profile_rank(&self, tag: Option<&str>) -> ProfileRank {
        let Some(tag) = tag.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()) else {
            return ProfileRank::Untagged;
        };
        profile_keys(&tag)
            .iter()
            .filter_map(|key| self.priority.iter().position(|p| p == key))
            .min()
            .map_or(ProfileRank::Other(tag), ProfileRank::Listed)
    }
}

/// Match keys for a profile tag: the tag itself plus its family name
fn profile_keys(tag: &str) -> Vec<String> {
    let mut keys = vec![tag.to_string()];
    let mut chars = tag.chars();
    let family = match chars.next() {
        Some('h') => Some("household"),
        Some('c') => Some("business"),
        _ => None,
    };
    let rest = chars.as_str();
    if let Some(family) = family
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_digit())
    {
        keys.push(family.to_string());
    }
    keys
}

fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.profile
        .cmp(&b.profile)
        .then_with(|| b.keyword_score.cmp(&a.keyword_score))
        .then_with(|| b.explicit_kwh.cmp(&a.explicit_kwh))
        .then_with(|| a.observation.subject_uri.cmp(&b.observation.subject_uri))
        .then_with(|| a.observation.predicate_uri.cmp(&b.observation.predicate_uri))
        .then_with(|| a.value.total_cmp(&b.value))
        .then_with(|| a.observation.unit.cmp(&b.observation.unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapper() -> PriceMapper {
        PriceMapper::new(&["household", "business"])
    }

    #[test]
    fn maps_energy_and_grid_only() {
        let observations = vec![
            Observation::new("ex:o1", "https://ex.org/dim/energiepreis", 0.12).with_unit("CHF/kWh"),
            Observation::new("ex:o1", "https://ex.org/dim/netzpreis", 0.08).with_unit("CHF/kWh"),
        ];
        let components = mapper().map(&observations);

        assert_eq!(components.len(), 2);
        let energy = &components[&PriceKind::Energy];
        assert_eq!(energy.value, 0.12);
        assert_eq!(energy.unit, PriceUnit::ChfPerKwh);
        assert_eq!(energy.source_observation_id, "ex:o1");
        assert_eq!(components[&PriceKind::Grid].value, 0.08);
        for kind in [PriceKind::Total, PriceKind::Fees, PriceKind::Metering] {
            assert!(!components.contains_key(&kind));
        }
    }

    #[test]
    fn profile_priority_decides_and_records_alternative() {
        let observations = vec![
            Observation::new("ex:biz", "ex:energy", 0.20).with_profile("business"),
            Observation::new("ex:home", "ex:energy", 0.12).with_profile("household"),
        ];
        let outcome = mapper().map_detailed(&observations);
        assert_eq!(outcome.components[&PriceKind::Energy].value, 0.12);
        assert_eq!(outcome.set_aside.len(), 1);
        assert_eq!(outcome.set_aside[0].observation.value, 0.20);
        assert_eq!(outcome.set_aside[0].chosen_observation_id, "ex:home");

        let reversed = PriceMapper::new(&["business", "household"]).map(&observations);
        assert_eq!(reversed[&PriceKind::Energy].value, 0.20);
    }

    #[test]
    fn profile_codes_match_family_names() {
        let observations = vec![
            Observation::new("ex:c2", "ex:energy", 0.21).with_profile("C2"),
            Observation::new("ex:h4", "ex:energy", 0.11).with_profile("h4"),
            Observation::new("ex:none", "ex:energy", 0.15),
        ];
        assert_eq!(mapper().map(&observations)[&PriceKind::Energy].value, 0.11);
    }

    #[test]
    fn untagged_beats_unlisted_profiles() {
        let observations = vec![
            Observation::new("ex:a", "ex:grid", 0.09).with_profile("agriculture"),
            Observation::new("ex:b", "ex:grid", 0.07),
        ];
        assert_eq!(mapper().map(&observations)[&PriceKind::Grid].value, 0.07);
    }

    #[test]
    fn implausible_values_are_absent() {
        let observations = vec![
            Observation::new("ex:o", "ex:total", 950.0),
            Observation::new("ex:o", "ex:metering", 1e7),
            Observation::new("ex:o", "ex:fee", -1.0),
            Observation::new("ex:o", "ex:comment", 1.0),
        ];
        let outcome = mapper().map_detailed(&observations);
        assert!(outcome.components.is_empty());
        assert_eq!(outcome.rejected, 3);
    }

    #[test]
    fn rappen_values_are_normalised() {
        let observations = vec![
            Observation::new("ex:o", "ex:total", 27.5),
            Observation::new("ex:o", "ex:aidfee", 2.5).with_unit("Rp./kWh"),
            Observation::new("ex:o", "ex:metering", 60.0).with_unit("CHF/year"),
        ];
        let components = mapper().map(&observations);
        assert_eq!(components[&PriceKind::Total].value, 0.275);
        assert_eq!(components[&PriceKind::Fees].value, 0.025);
        assert_eq!(components[&PriceKind::Metering].unit, PriceUnit::ChfPerYear);
    }

    #[test]
    fn unitless_rates_of_one_observation_share_a_unit() {
        let observations = vec![
            Observation::new("ex:o", "ex:total", 27.31),
            Observation::new("ex:o", "ex:energy", 12.0),
            Observation::new("ex:o", "ex:charge", 0.9),
        ];
        let components = mapper().map(&observations);
        let total = components[&PriceKind::Total].value;
        let fees = components[&PriceKind::Fees].value;
        assert!((total - 0.2731).abs() < 1e-12);
        assert!((components[&PriceKind::Energy].value - 0.12).abs() < 1e-12);
        assert!((fees - 0.009).abs() < 1e-12);
        assert!(fees <= total);
    }

    #[test]
    fn small_unitless_rates_stay_in_chf() {
        let observations = vec![
            Observation::new("ex:o", "ex:total", 0.2731),
            Observation::new("ex:o", "ex:charge", 0.009),
            Observation::new("ex:o", "ex:metering", 48.0),
            // another observation's Rappen figures do not leak over
            Observation::new("ex:p", "ex:grid", 9.5),
        ];
        let components = mapper().map(&observations);
        assert_eq!(components[&PriceKind::Total].value, 0.2731);
        assert_eq!(components[&PriceKind::Fees].value, 0.009);
        assert_eq!(components[&PriceKind::Metering].unit, PriceUnit::ChfPerMonth);
        assert_eq!(components[&PriceKind::Grid].value, 0.095);
    }

    #[test]
    fn namespaced_chf_unit_is_not_read_as_rappen() {
        let unit = "https://energy.ld.admin.ch/elcom/electricityprice/unit/CHF-per-kWh";
        let observations = vec![Observation::new("ex:o", "ex:energy", 0.12).with_unit(unit)];
        let energy = &mapper().map(&observations)[&PriceKind::Energy];
        assert_eq!(energy.value, 0.12);
        assert_eq!(energy.unit, PriceUnit::ChfPerKwh);
    }

    #[test]
    fn explicit_kwh_unit_wins_over_missing_unit() {
        let observations = vec![
            Observation::new("ex:a", "ex:energy", 0.30),
            Observation::new("ex:b", "ex:energy", 0.10).with_unit("CHF/kWh"),
        ];
        assert_eq!(mapper().map(&observations)[&PriceKind::Energy].source_observation_id, "ex:b");
    }

    fn arb_observation() -> impl Strategy<Value = Observation> {
        (
            prop::sample::select(vec!["ex:o1", "ex:o2", "ex:o3"]),
            prop::sample::select(vec!["ex:energy", "ex:netz", "ex:total", "ex:aidfee", "ex:meter", "ex:misc"]),
            0.0f64..300.0,
            prop::option::of(prop::sample::select(vec!["CHF/kWh", "Rp./kWh", "CHF/month", "EUR"])),
            prop::option::of(prop::sample::select(vec!["household", "business", "h4", "c3", "other"])),
        )
            .prop_map(|(s, p, v, unit, profile)| Observation {
                subject_uri: s.to_string(),
                predicate_uri: p.to_string(),
                value: v,
                unit: unit.map(str::to_string),
                profile_tag: profile.map(str::to_string),
            })
    }

    proptest! {
        #[test]
        fn mapping_is_invariant_under_shuffling(
            (observations, shuffled) in prop::collection::vec(arb_observation(), 0..24)
                .prop_flat_map(|obs| {
                    let shuffled = Just(obs.clone()).prop_shuffle();
                    (Just(obs), shuffled)
                })
        ) {
            let m = mapper();
            let a = m.map(&observations);
            let b = m.map(&shuffled);
            prop_assert_eq!(a.len(), b.len());
            for (kind, component) in &a {
                prop_assert!(component.value >= 0.0 && component.value.is_finite());
                prop_assert_eq!(Some(component), b.get(kind));
            }
        }
    }
}
