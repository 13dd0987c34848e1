use crate::error::{Result, TariffError};
use serde::Deserialize;
use std::collections::BTreeMap;

/// XML Schema namespace used for literal datatypes
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// One bound value of a SPARQL result row
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// IRI reference
    Uri(String),
    /// Blank node label
    BlankNode(String),
    /// Plain or typed literal that is not numeric
    Literal {
        value: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
    /// Literal with a numeric (or gYear) datatype
    Numeric {
        value: f64,
        lexical: String,
        datatype: String,
    },
}

impl Term {
    /// Build a literal, promoting numeric datatypes to [`Term::Numeric`]
    pub fn literal(value: String, datatype: Option<String>, lang: Option<String>) -> Self {
        if let Some(dt) = datatype.as_deref()
            && is_numeric_datatype(dt)
            && let Some(number) = parse_numeric(&value, dt)
        {
            return Term::Numeric {
                value: number,
                lexical: value,
                datatype: dt.to_string(),
            };
        }
        Term::Literal {
            value,
            datatype,
            lang,
        }
    }

    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Term::Uri(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Term::Numeric { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Lexical form regardless of the term kind
    pub fn lexical(&self) -> &str {
        match self {
            Term::Uri(v) | Term::BlankNode(v) => v,
            Term::Literal { value, .. } => value,
            Term::Numeric { lexical, .. } => lexical,
        }
    }

    pub fn datatype(&self) -> Option<&str> {
        match self {
            Term::Literal { datatype, .. } => datatype.as_deref(),
            Term::Numeric { datatype, .. } => Some(datatype),
            _ => None,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Term::Uri(_))
    }
}

/// One result row: variable name to bound term
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphBinding {
    values: BTreeMap<String, Term>,
}

impl GraphBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: &str, term: Term) -> Self {
        self.values.insert(var.to_string(), term);
        self
    }

    pub fn insert(&mut self, var: &str, term: Term) {
        self.values.insert(var.to_string(), term);
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.values.get(var)
    }

    /// IRI bound to `var`, if the binding is an IRI
    pub fn uri(&self, var: &str) -> Option<&str> {
        self.get(var).and_then(Term::as_uri)
    }

    /// Lexical form bound to `var`
    pub fn text(&self, var: &str) -> Option<&str> {
        self.get(var).map(Term::lexical)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parsed `application/sparql-results+json` document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub vars: Vec<String>,
    pub bindings: Vec<GraphBinding>,
}

#[derive(Deserialize)]
struct RawDocument {
    head: RawHead,
    results: RawResults,
}

#[derive(Deserialize)]
struct RawHead {
    vars: Vec<String>,
}

#[derive(Deserialize)]
struct RawResults {
    bindings: Vec<BTreeMap<String, RawTerm>>,
}

#[derive(Deserialize)]
struct RawTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

/// Parse a SPARQL JSON results body
pub fn parse_results(body: &[u8]) -> Result<ResultSet> {
    let raw: RawDocument = serde_json::from_slice(body)
        .map_err(|e| TariffError::malformed(format!("invalid SPARQL JSON results: {}", e)))?;

    let mut bindings = Vec::with_capacity(raw.results.bindings.len());
    for row in raw.results.bindings {
        let mut binding = GraphBinding::new();
        for (var, term) in row {
            let parsed = match term.kind.as_str() {
                "uri" => Term::Uri(term.value),
                "bnode" => Term::BlankNode(term.value),
                "literal" | "typed-literal" => Term::literal(term.value, term.datatype, term.lang),
                other => {
                    return Err(TariffError::malformed(format!(
                        "unknown term type '{}' for ?{}",
                        other, var
                    )));
                }
            };
            binding.insert(&var, parsed);
        }
        bindings.push(binding);
    }

    Ok(ResultSet {
        vars: raw.head.vars,
        bindings,
    })
}

fn xsd_local(datatype: &str) -> Option<&str> {
    datatype.strip_prefix(XSD)
}

pub fn is_numeric_datatype(datatype: &str) -> bool {
    matches!(
        xsd_local(datatype),
        Some(
            "integer"
                | "decimal"
                | "double"
                | "float"
                | "int"
                | "long"
                | "short"
                | "nonNegativeInteger"
                | "positiveInteger"
                | "gYear"
        )
    )
}

pub fn is_integer_datatype(datatype: &str) -> bool {
    matches!(
        xsd_local(datatype),
        Some("integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" | "gYear")
    )
}

fn parse_numeric(lexical: &str, datatype: &str) -> Option<f64> {
    let trimmed = lexical.trim();
    let candidate = if xsd_local(datatype) == Some("gYear") {
        // gYear may carry a timezone suffix such as "2024Z" or "2024+01:00"
        let digits: String = trimmed
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
            .map(|(_, c)| c)
            .collect();
        digits
    } else {
        trimmed.to_string()
    };
    candidate.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Last path or fragment segment of an IRI
pub fn local_name(iri: &str) -> &str {
    let trimmed = iri.trim_end_matches(['/', '#']);
    match trimmed.rfind(['/', '#', ':']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "head": {"vars": ["s", "o"]},
        "results": {"bindings": [
            {"s": {"type": "uri", "value": "https://ex.org/obs/1"},
             "o": {"type": "literal", "value": "0.12", "datatype": "http://www.w3.org/2001/XMLSchema#decimal"}},
            {"s": {"type": "bnode", "value": "b0"},
             "o": {"type": "literal", "value": "Erlenbach", "xml:lang": "de"}},
            {"s": {"type": "uri", "value": "https://ex.org/obs/2"},
             "o": {"type": "typed-literal", "value": "2024Z", "datatype": "http://www.w3.org/2001/XMLSchema#gYear"}}
        ]}
    }"#;

    #[test]
    fn parses_tagged_terms() {
        let rs = parse_results(DOC.as_bytes()).unwrap();
        assert_eq!(rs.vars, vec!["s", "o"]);
        assert_eq!(rs.bindings.len(), 3);

        let first = &rs.bindings[0];
        assert_eq!(first.uri("s"), Some("https://ex.org/obs/1"));
        assert_eq!(first.get("o").and_then(Term::as_number), Some(0.12));

        let second = &rs.bindings[1];
        assert!(matches!(second.get("s"), Some(Term::BlankNode(_))));
        match second.get("o") {
            Some(Term::Literal { value, lang, .. }) => {
                assert_eq!(value, "Erlenbach");
                assert_eq!(lang.as_deref(), Some("de"));
            }
            other => panic!("unexpected term {:?}", other),
        }

        assert_eq!(rs.bindings[2].get("o").and_then(Term::as_number), Some(2024.0));
    }

    #[test]
    fn missing_keys_are_malformed() {
        let err = parse_results(br#"{"results": {"bindings": []}}"#).unwrap_err();
        assert!(matches!(err, TariffError::MalformedResponse { .. }));

        let err = parse_results(br#"{"head": {"vars": []}}"#).unwrap_err();
        assert!(matches!(err, TariffError::MalformedResponse { .. }));

        let err = parse_results(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, TariffError::MalformedResponse { .. }));
    }

    #[test]
    fn unknown_term_type_is_malformed() {
        let body = br#"{"head":{"vars":["x"]},"results":{"bindings":[{"x":{"type":"triple","value":"?"}}]}}"#;
        assert!(matches!(
            parse_results(body),
            Err(TariffError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn unparsable_numeric_stays_literal() {
        let term = Term::literal(
            "n/a".to_string(),
            Some(format!("{}decimal", XSD)),
            None,
        );
        assert!(matches!(term, Term::Literal { .. }));
        assert_eq!(term.lexical(), "n/a");
    }

    #[test]
    fn local_name_variants() {
        assert_eq!(local_name("https://ex.org/dim/energiepreis"), "energiepreis");
        assert_eq!(local_name("http://schema.org/name#label"), "label");
        assert_eq!(local_name("ex:jahr"), "jahr");
        assert_eq!(local_name("https://ex.org/dim/"), "dim");
        assert_eq!(local_name("plain"), "plain");
    }
}
