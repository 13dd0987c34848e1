use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, TariffError};

use super::transport::{HttpResponse, HttpTransport};

/// Canned answer for a routed query
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(String),
    Status(u16),
    Refused,
    Stall,
    Delayed(Duration, String),
}

/// In-process transport answering queries by substring routes
///
/// One-shot routes are consumed before persistent ones, which lets a test
/// script a failure followed by a success for the same query.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    once: Mutex<Vec<(String, Reply)>>,
    routes: Mutex<Vec<(String, Reply)>>,
    queries: Mutex<Vec<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(self, needle: &str, reply: Reply) -> Self {
        self.set_route(needle, reply);
        self
    }

    pub(crate) fn once(self, needle: &str, reply: Reply) -> Self {
        self.once
            .lock()
            .unwrap()
            .push((needle.to_string(), reply));
        self
    }

    /// Replace (or add) the persistent route for `needle`
    pub(crate) fn set_route(&self, needle: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(n, _)| n != needle);
        routes.push((needle.to_string(), reply));
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.contains(needle))
            .count()
    }

    fn pick(&self, query: &str) -> Option<Reply> {
        let mut once = self.once.lock().unwrap();
        if let Some(pos) = once.iter().position(|(n, _)| query.contains(n.as_str())) {
            return Some(once.remove(pos).1);
        }
        drop(once);
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| query.contains(n.as_str()))
            .map(|(_, r)| r.clone())
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn post(
        &self,
        _url: &str,
        body: String,
        _headers: &[(&str, &str)],
        _timeout: Duration,
    ) -> Result<HttpResponse> {
        self.queries.lock().unwrap().push(body.clone());
        let ok = |b: String| HttpResponse {
            status: 200,
            body: b.into_bytes(),
        };
        match self.pick(&body) {
            Some(Reply::Json(b)) => Ok(ok(b)),
            Some(Reply::Status(status)) => Ok(HttpResponse {
                status,
                body: b"upstream error".to_vec(),
            }),
            Some(Reply::Refused) => Err(TariffError::transport("connection refused")),
            Some(Reply::Stall) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ok(String::new()))
            }
            Some(Reply::Delayed(d, b)) => {
                tokio::time::sleep(d).await;
                Ok(ok(b))
            }
            None => Ok(HttpResponse {
                status: 404,
                body: b"no route".to_vec(),
            }),
        }
    }
}

/// SPARQL JSON results document from `(var, term)` rows
pub(crate) fn results(vars: &[&str], rows: Vec<Vec<(&str, serde_json::Value)>>) -> String {
    let bindings: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> =
                row.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
            serde_json::Value::Object(map)
        })
        .collect();
    serde_json::json!({
        "head": {"vars": vars},
        "results": {"bindings": bindings}
    })
    .to_string()
}

pub(crate) fn uri(value: &str) -> serde_json::Value {
    serde_json::json!({"type": "uri", "value": value})
}

pub(crate) fn lit(value: &str) -> serde_json::Value {
    serde_json::json!({"type": "literal", "value": value})
}

pub(crate) fn typed(value: &str, xsd_local: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "literal",
        "value": value,
        "datatype": format!("{}{}", super::types::XSD, xsd_local)
    })
}
