use crate::model::{PriceKind, PriceUnit};
use crate::sparql::local_name;

/// Largest plausible rate in CHF/kWh
pub const MAX_CHF_PER_KWH: f64 = 2.0;
/// Largest plausible rate in Rp./kWh
pub const MAX_RAPPEN_PER_KWH: f64 = 200.0;
pub const MAX_CHF_PER_MONTH: f64 = 500.0;
pub const MAX_CHF_PER_YEAR: f64 = 6000.0;

/// Unit as stated by the observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitHint {
    ChfPerKwh,
    RappenPerKwh,
    ChfPerMonth,
    ChfPerYear,
    Unrecognized,
    Missing,
}

impl UnitHint {
    /// States a per-kWh unit explicitly
    pub fn is_per_kwh(self) -> bool {
        matches!(self, UnitHint::ChfPerKwh | UnitHint::RappenPerKwh)
    }
}

/// Interpret unit text or a unit IRI
///
/// IRIs are judged by their local name only, and markers must be whole
/// tokens, so namespaces such as `.../electricityprice/...` never read as a unit.
pub fn parse_unit(text: Option<&str>) -> UnitHint {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return UnitHint::Missing;
    };
    let unit_text = if is_iri(text) { local_name(text) } else { text };
    let lower = unit_text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let compact: String = tokens.concat();

    let per_kwh = compact.contains("kwh") || compact.contains("kilowhr") || compact.contains("kilowatthour");
    let rappen = has_token(&tokens, &["rp", "rappen", "ct", "cent", "cents", "centime", "centimes"]);

    if per_kwh {
        if rappen { UnitHint::RappenPerKwh } else { UnitHint::ChfPerKwh }
    } else if has_token(&tokens, &["month", "months", "monat", "mo", "mon", "monthly", "monatlich"]) {
        UnitHint::ChfPerMonth
    } else if has_token(&tokens, &["year", "years", "yearly", "jahr", "annum", "annual", "yr", "a"]) {
        UnitHint::ChfPerYear
    } else {
        UnitHint::Unrecognized
    }
}

fn has_token(tokens: &[&str], markers: &[&str]) -> bool {
    tokens.iter().any(|t| markers.contains(t))
}

fn is_iri(text: &str) -> bool {
    text.contains("://") || text.starts_with("urn:")
}

/// Unit implied for the unit-less per-kWh figures of one observation.
///
/// The dataset publishes rates in Rp./kWh; one figure above the CHF range
/// means every unit-less rate of that observation is in Rappen.
pub fn implied_rate_unit<I>(values: I) -> UnitHint
where
    I: IntoIterator<Item = f64>,
{
    if values.into_iter().any(|v| v.is_finite() && v > MAX_CHF_PER_KWH) {
        UnitHint::RappenPerKwh
    } else {
        UnitHint::ChfPerKwh
    }
}

/// Normalised value and unit, or `None` when the magnitude fits no unit
///
/// A unit-less rate is read as CHF/kWh here; callers that know the
/// observation's implied unit pass it via [`implied_rate_unit`] instead.
pub fn normalize(kind: PriceKind, value: f64, hint: UnitHint) -> Option<(f64, PriceUnit)> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let per_kwh = |v: f64| (v <= MAX_CHF_PER_KWH).then_some((v, PriceUnit::ChfPerKwh));

    match hint {
        UnitHint::ChfPerKwh => per_kwh(value),
        UnitHint::RappenPerKwh => (value <= MAX_RAPPEN_PER_KWH).then_some((value / 100.0, PriceUnit::ChfPerKwh)),
        UnitHint::ChfPerMonth => (value <= MAX_CHF_PER_MONTH).then_some((value, PriceUnit::ChfPerMonth)),
        UnitHint::ChfPerYear => (value <= MAX_CHF_PER_YEAR).then_some((value, PriceUnit::ChfPerYear)),
        UnitHint::Unrecognized => (value <= MAX_CHF_PER_YEAR).then_some((value, PriceUnit::Unknown)),
        UnitHint::Missing if kind == PriceKind::Metering => {
            if value <= MAX_CHF_PER_KWH {
                Some((value, PriceUnit::ChfPerKwh))
            } else if value <= MAX_CHF_PER_MONTH {
                Some((value, PriceUnit::ChfPerMonth))
            } else if value <= MAX_CHF_PER_YEAR {
                Some((value, PriceUnit::ChfPerYear))
            } else {
                None
            }
        }
        UnitHint::Missing => per_kwh(value),
    }
}
