use super::*;

/// Public LINDAS SPARQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://lindas.admin.ch/query";

/// Named graph of the ElCom electricity price cube
pub const DEFAULT_NAMED_GRAPH: &str = "https://lindas.admin.ch/elcom/electricityprice";

pub const DEFAULT_UPDATE_INTERVAL_HOURS: u32 = 24;

pub(super) fn default_update_interval_hours() -> u32 {
    DEFAULT_UPDATE_INTERVAL_HOURS
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
            named_graph: DEFAULT_NAMED_GRAPH.to_string(),
            timeout_secs: 20,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sample_limit: 200,
            min_confidence: 0.3,
            schema_cache_hours: 168,
            fetch_limit: 5000,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 1000,
            raw_observation_cap: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/elcom_tariffs.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            entities: Vec::new(),
            profile_priority: [
                "household",
                "h4",
                "h3",
                "h2",
                "h1",
                "business",
                "c2",
                "c1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            discovery: DiscoveryConfig::default(),
            refresh: RefreshConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}
