use std::sync::Arc;
use std::time::Duration;

use crate::config::EndpointConfig;
use crate::error::{Result, TariffError};
use crate::logging::get_logger;

use super::transport::{HttpTransport, ReqwestTransport};
use super::types::{GraphBinding, ResultSet, parse_results};

const ACCEPT_RESULTS: &str = "application/sparql-results+json";
const CONTENT_TYPE_QUERY: &str = "application/sparql-query; charset=UTF-8";

/// SPARQL query client bound to one endpoint
///
/// Cloning is cheap and clones share the underlying transport, so one
/// client can serve every configured entity concurrently.
#[derive(Clone)]
pub struct SparqlClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    named_graph: Option<String>,
    timeout: Duration,
    logger: crate::logging::StructuredLogger,
}

impl SparqlClient {
    /// Create a client over an explicit transport
    pub fn new(transport: Arc<dyn HttpTransport>, config: &EndpointConfig) -> Self {
        let named_graph = Some(config.named_graph.trim().to_string()).filter(|g| !g.is_empty());
        Self {
            transport,
            endpoint: config.url.clone(),
            named_graph,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            logger: get_logger("sparql"),
        }
    }

    /// Create a client with a fresh reqwest transport
    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn named_graph(&self) -> Option<&str> {
        self.named_graph.as_deref()
    }

    /// `FROM <graph>` line for SELECT queries, empty for the default graph
    pub fn from_clause(&self) -> String {
        match &self.named_graph {
            Some(g) => format!("FROM <{}>\n", g),
            None => String::new(),
        }
    }

    /// Execute a SELECT query and return its rows
    pub async fn execute(&self, query: &str) -> Result<Vec<GraphBinding>> {
        Ok(self.select(query).await?.bindings)
    }

    /// Execute a SELECT query and return the full result set
    pub async fn select(&self, query: &str) -> Result<ResultSet> {
        self.logger
            .debug(&format!("SPARQL request (query_bytes={})", query.len()));

        let headers = [("Accept", ACCEPT_RESULTS), ("Content-Type", CONTENT_TYPE_QUERY)];
        let call = self
            .transport
            .post(&self.endpoint, query.to_string(), &headers, self.timeout);
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TariffError::timeout(format!(
                    "SPARQL request exceeded {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !response.is_success() {
            let snippet: String = String::from_utf8_lossy(&response.body)
                .chars()
                .take(200)
                .collect();
            return Err(TariffError::transport(format!(
                "SPARQL HTTP {}: {}",
                response.status, snippet
            )));
        }

        let result = parse_results(&response.body)?;
        self.logger.debug(&format!(
            "SPARQL response (rows={}, body_bytes={})",
            result.bindings.len(),
            response.body.len()
        ));
        Ok(result)
    }
}
