//! SPARQL query client for the LINDAS graph endpoint
//!
//! Queries are posted as `application/sparql-query` bodies and answered as
//! SPARQL JSON results, which are parsed into tagged [`Term`] values so the
//! discovery and mapping layers can match on them exhaustively.

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;
pub mod types;

pub use client::SparqlClient;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{GraphBinding, ResultSet, Term, local_name, parse_results};

use crate::error::{Result, TariffError};

/// Escape a value for use inside a double-quoted SPARQL string literal
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Render an IRI as `<...>` after rejecting characters that would break the query
pub fn iri_ref(iri: &str) -> Result<String> {
    let trimmed = iri.trim();
    if trimmed.is_empty() {
        return Err(TariffError::validation("iri", "IRI cannot be empty"));
    }
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\'))
    {
        return Err(TariffError::validation(
            "iri".to_string(),
            format!("IRI contains forbidden characters: {}", trimmed),
        ));
    }
    Ok(format!("<{}>", trimmed))
}
