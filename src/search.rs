//! Municipality search
//!
//! Case-insensitive substring search over municipality labels. The endpoint
//! supplies a candidate pool; filtering, de-duplication and ranking happen
//! here so the ordering does not depend on the endpoint's row order.

use std::collections::BTreeMap;

use crate::error::{Result, TariffError};
use crate::logging::get_logger;
use crate::model::MunicipalityMatch;
use crate::sparql::{SparqlClient, escape_literal};

/// Maximum matches returned to callers
pub const MAX_MATCHES: usize = 10;

/// Candidate rows requested from the endpoint before client-side ranking
const CANDIDATE_POOL: usize = 50;

/// How a label matches the search term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Exact,
    Prefix,
    Substring,
}

/// Search municipalities whose label contains `term`
pub async fn search_municipalities(
    client: &SparqlClient,
    term: &str,
) -> Result<Vec<MunicipalityMatch>> {
    let logger = get_logger("search");
    let needle = normalized_term(term)?;

    let query = build_search_query(client, &needle);
    let rows = client.execute(&query).await.inspect_err(|e| {
        logger.warn(&format!(
            "Search query failed (term_len={}, query_bytes={}): {}",
            needle.chars().count(),
            query.len(),
            e
        ));
    })?;

    let candidates = rows
        .iter()
        .filter_map(|row| Some((row.uri("muni")?, row.text("label")?)));
    let matches = rank_matches(&needle, candidates);

    logger.debug(&format!(
        "Search complete (term_len={}, rows={}, matches={})",
        needle.chars().count(),
        rows.len(),
        matches.len()
    ));
    Ok(matches)
}

/// Trimmed term, rejecting empty input
pub fn normalized_term(term: &str) -> Result<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return Err(TariffError::invalid_search_term(
            "Search term must not be empty",
        ));
    }
    Ok(trimmed.to_string())
}

fn build_search_query(client: &SparqlClient, term: &str) -> String {
    format!(
        "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
         PREFIX schema: <http://schema.org/>\n\
         SELECT DISTINCT ?muni ?label\n\
         {from}WHERE {{\n\
         \x20 ?muni (rdfs:label|schema:name) ?label .\n\
         \x20 FILTER(isIRI(?muni))\n\
         \x20 FILTER(CONTAINS(LCASE(STR(?label)), LCASE(\"{term}\")))\n\
         }}\n\
         ORDER BY DESC(LCASE(STR(?label)) = LCASE(\"{term}\"))\n\
         \x20        DESC(STRSTARTS(LCASE(STR(?label)), LCASE(\"{term}\")))\n\
         \x20        STRLEN(STR(?label)) STR(?label) STR(?muni)\n\
         LIMIT {limit}\n",
        from = client.from_clause(),
        term = escape_literal(term),
        limit = CANDIDATE_POOL,
    )
}

/// Filter, de-duplicate by URI and rank `(uri, label)` candidates
pub fn rank_matches<'a, I>(term: &str, candidates: I) -> Vec<MunicipalityMatch>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    // Best label per URI
    let mut best: BTreeMap<String, (MatchTier, String)> = BTreeMap::new();
    for (uri, label) in candidates {
        let uri = uri.trim();
        if uri.is_empty() {
            continue;
        }
        let Some(tier) = classify(&needle, label) else {
            continue;
        };
        let better = best
            .get(uri)
            .is_none_or(|current| rank_key(tier, label) < rank_key(current.0, &current.1));
        if better {
            best.insert(uri.to_string(), (tier, label.to_string()));
        }
    }

    let mut ranked: Vec<(MatchTier, String, String)> = best
        .into_iter()
        .map(|(uri, (tier, label))| (tier, label, uri))
        .collect();
    ranked.sort_by(|a, b| {
        rank_key(a.0, &a.1)
            .cmp(&rank_key(b.0, &b.1))
            .then_with(|| a.2.cmp(&b.2))
    });
    ranked.truncate(MAX_MATCHES);

    let needle_len = needle.chars().count();
    ranked
        .into_iter()
        .map(|(tier, label, uri)| {
            let score = score(tier, needle_len, label.chars().count());
            MunicipalityMatch { label, uri, score }
        })
        .collect()
}

fn classify(needle: &str, label: &str) -> Option<MatchTier> {
    let haystack = label.to_lowercase();
    if haystack == needle {
        Some(MatchTier::Exact)
    } else if haystack.starts_with(needle) {
        Some(MatchTier::Prefix)
    } else if haystack.contains(needle) {
        Some(MatchTier::Substring)
    } else {
        None
    }
}

/// Tier, then shorter label, then lexical label
fn rank_key(tier: MatchTier, label: &str) -> (MatchTier, usize, &str) {
    (tier, label.chars().count(), label)
}

fn score(tier: MatchTier, needle_len: usize, label_len: usize) -> f64 {
    let ratio = if label_len == 0 {
        0.0
    } else {
        (needle_len as f64 / label_len as f64).min(1.0)
    };
    match tier {
        MatchTier::Exact => 1.0,
        MatchTier::Prefix => 0.5 + 0.5 * ratio,
        MatchTier::Substring => 0.5 * ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::sparql::mock::{MockTransport, Reply, lit, results, uri};
    use std::sync::Arc;

    fn client(transport: MockTransport) -> SparqlClient {
        SparqlClient::new(Arc::new(transport), &EndpointConfig::default())
    }

    fn municipalities() -> String {
        results(
            &["muni", "label"],
            vec![
                vec![
                    ("muni", uri("https://ld.admin.ch/municipality/151")),
                    ("label", lit("Erlenbach (ZH)")),
                ],
                vec![
                    ("muni", uri("https://ld.admin.ch/municipality/763")),
                    ("label", lit("Erlenbach im Simmental")),
                ],
                vec![
                    ("muni", uri("https://ld.admin.ch/municipality/151")),
                    ("label", lit("Erlenbach")),
                ],
                vec![
                    ("muni", uri("https://ld.admin.ch/municipality/999")),
                    ("label", lit("Unrelated")),
                ],
            ],
        )
    }

    #[tokio::test]
    async fn test_search_ranks_and_dedupes() {
        let transport = MockTransport::new().route("Erlenbach", Reply::Json(municipalities()));
        let matches = search_municipalities(&client(transport), "  Erlenbach ")
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].label, "Erlenbach");
        assert_eq!(matches[0].uri, "https://ld.admin.ch/municipality/151");
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[1].label, "Erlenbach im Simmental");
        assert!(matches.iter().all(|m| m.label.to_lowercase().contains("erlenbach")));
    }

    #[tokio::test]
    async fn test_search_without_results_is_empty() {
        let empty = results(&["muni", "label"], vec![]);
        let transport = MockTransport::new().route("zzznotamunicipality", Reply::Json(empty));
        let matches = search_municipalities(&client(transport), "zzznotamunicipality")
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_blank_term_is_rejected_without_query() {
        let transport = Arc::new(MockTransport::new());
        let client = SparqlClient::new(transport.clone(), &EndpointConfig::default());
        let err = search_municipalities(&client, "   ").await.unwrap_err();
        assert!(matches!(err, TariffError::InvalidSearchTerm { .. }));
        assert!(transport.queries().is_empty());
    }

    #[tokio::test]
    async fn test_search_escapes_term_and_scopes_graph() {
        let transport = Arc::new(
            MockTransport::new().route("SELECT", Reply::Json(results(&["muni", "label"], vec![]))),
        );
        let client = SparqlClient::new(transport.clone(), &EndpointConfig::default());
        search_municipalities(&client, "St. \"Gallen\"").await.unwrap();

        let queries = transport.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains(r#"LCASE("St. \"Gallen\"")"#));
        assert!(queries[0].contains("FROM <https://lindas.admin.ch/elcom/electricityprice>"));
        assert!(queries[0].contains("LIMIT 50"));
    }

    #[tokio::test]
    async fn test_candidate_pool_is_ranked_before_limit() {
        let transport = Arc::new(
            MockTransport::new().route("SELECT", Reply::Json(results(&["muni", "label"], vec![]))),
        );
        let client = SparqlClient::new(transport.clone(), &EndpointConfig::default());
        search_municipalities(&client, "Bern").await.unwrap();

        let query = &transport.queries()[0];
        let order = query.find("ORDER BY").unwrap();
        assert!(order < query.find("LIMIT 50").unwrap());
        assert!(query.contains(r#"DESC(LCASE(STR(?label)) = LCASE("Bern"))"#));
        assert!(query.contains(r#"DESC(STRSTARTS(LCASE(STR(?label)), LCASE("Bern")))"#));
        assert!(query.contains("STRLEN(STR(?label)) STR(?label) STR(?muni)"));
    }

    #[tokio::test]
    async fn test_search_transport_failure_propagates() {
        let transport = MockTransport::new().route("SELECT", Reply::Status(502));
        let err = search_municipalities(&client(transport), "Bern").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_rank_tie_breaks() {
        let rows = vec![
            ("u:3", "Bernex"),
            ("u:1", "Bern"),
            ("u:2", "Berneck"),
            ("u:4", "Ostermundigen bei Bern"),
            ("u:5", "Bernau"),
            ("", "Bern"),
        ];
        let ranked = rank_matches("bern", rows);
        let labels: Vec<&str> = ranked.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Bern", "Bernau", "Bernex", "Berneck", "Ostermundigen bei Bern"]
        );
        assert!(ranked[1].score > 0.5 && ranked[1].score < 1.0);
        assert!(ranked[4].score < 0.5);
    }

    #[test]
    fn test_rank_is_order_independent_and_capped() {
        let owned: Vec<(String, String)> = (0..30)
            .map(|i| (format!("u:{:02}", i), format!("Wil {}", i)))
            .collect();
        let forward: Vec<(&str, &str)> = owned.iter().map(|(u, l)| (u.as_str(), l.as_str())).collect();
        let mut backward = forward.clone();
        backward.reverse();

        let a = rank_matches("wil", forward);
        let b = rank_matches("wil", backward);
        assert_eq!(a.len(), MAX_MATCHES);
        assert_eq!(a, b);
    }
}
