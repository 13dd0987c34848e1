use crate::model::PriceKind;
use crate::sparql::local_name;

/// Keyword sets per kind, matched against the lowercased predicate local name
const KEYWORDS: [(PriceKind, &[&str]); 5] = [
    (PriceKind::Total, &["total", "gesamt", "summe"]),
    (PriceKind::Energy, &["energie", "energy", "arbeit"]),
    (PriceKind::Grid, &["netz", "grid", "gridusage"]),
    (
        PriceKind::Fees,
        &["abgabe", "fee", "levy", "charge", "gebuehr", "gebühr"],
    ),
    (
        PriceKind::Metering,
        &["messung", "metering", "meter", "mess", "grundpreis", "fixcost"],
    ),
];

/// Number of keywords of `kind` found in `name`
fn hits(name: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| name.contains(*k)).count()
}

/// Classify a predicate IRI; most keyword hits wins, ties go to the earlier kind
pub fn classify(predicate_uri: &str) -> Option<(PriceKind, usize)> {
    let name = local_name(predicate_uri).to_lowercase();
    KEYWORDS
        .iter()
        .map(|(kind, words)| (*kind, hits(&name, words)))
        .filter(|(_, score)| *score > 0)
        .fold(None, |best: Option<(PriceKind, usize)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_german_and_english_names() {
        assert_eq!(classify("https://ex.org/energiepreis").map(|c| c.0), Some(PriceKind::Energy));
        assert_eq!(classify("https://ex.org/netzpreis").map(|c| c.0), Some(PriceKind::Grid));
        assert_eq!(classify("https://ex.org/gridusage").map(|c| c.0), Some(PriceKind::Grid));
        assert_eq!(classify("https://ex.org/aidfee").map(|c| c.0), Some(PriceKind::Fees));
        assert_eq!(classify("https://ex.org/Gesamtpreis").map(|c| c.0), Some(PriceKind::Total));
        assert_eq!(classify("https://ex.org/meteringrate").map(|c| c.0), Some(PriceKind::Metering));
        assert_eq!(classify("https://ex.org/messung").map(|c| c.0), Some(PriceKind::Metering));
        assert_eq!(classify("https://ex.org/comment"), None);
    }

    #[test]
    fn more_hits_beat_kind_order() {
        // "gridusage" scores 2 for grid
        assert_eq!(classify("ex:totalgridusage"), Some((PriceKind::Grid, 2)));
    }

    #[test]
    fn ties_follow_kind_order() {
        assert_eq!(classify("ex:netzcharge"), Some((PriceKind::Grid, 1)));
        assert_eq!(classify("ex:energietotal"), Some((PriceKind::Total, 1)));
    }
}
