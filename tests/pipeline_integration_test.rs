use elcom_tariffs::config::{Config, EntityConfig};
use elcom_tariffs::coordinator::{CoordinatorRegistry, RefreshState, TariffPipeline};
use elcom_tariffs::model::{PriceKind, PriceUnit};
use elcom_tariffs::sensor::current_report;
use elcom_tariffs::sparql::SparqlClient;
use mockito::{Matcher, Server};
use serde_json::{Value, json};
use std::sync::Arc;

const MUNI: &str = "https://ld.admin.ch/municipality/261";
const DIM: &str = "https://energy.ld.admin.ch/elcom/electricityprice/dimension/";
const CATEGORY: &str = "https://energy.ld.admin.ch/elcom/electricityprice/category/";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

fn row(obs: &str, p: &str, o: Value) -> Value {
    json!({"obs": {"type": "uri", "value": obs}, "p": {"type": "uri", "value": p}, "o": o})
}

fn decimal(v: &str) -> Value {
    json!({"type": "literal", "value": v, "datatype": format!("{XSD}decimal")})
}

fn observation(obs: &str, category: &str, energy: &str) -> Vec<Value> {
    let mut category_row = row(
        obs,
        &format!("{DIM}category"),
        json!({"type": "uri", "value": format!("{CATEGORY}{category}")}),
    );
    category_row["olabel"] = json!({"type": "literal", "value": category});
    vec![
        row(obs, RDF_TYPE, json!({"type": "uri", "value": "https://cube.link/Observation"})),
        row(obs, &format!("{DIM}municipality"), json!({"type": "uri", "value": MUNI})),
        row(
            obs,
            &format!("{DIM}period"),
            json!({"type": "literal", "value": "2024", "datatype": format!("{XSD}gYear")}),
        ),
        category_row,
        row(obs, &format!("{DIM}total"), decimal("27.5")),
        row(obs, &format!("{DIM}energy"), decimal(energy)),
        row(obs, &format!("{DIM}gridusage"), decimal("9.5")),
        row(obs, &format!("{DIM}aidfee"), decimal("2.5")),
    ]
}

fn cube_body() -> String {
    let mut bindings = observation("https://ex.org/obs/business", "C2", "20.0");
    bindings.extend(observation("https://ex.org/obs/household", "H4", "12.0"));
    json!({
        "head": {"vars": ["obs", "p", "o", "olabel"]},
        "results": {"bindings": bindings}
    })
    .to_string()
}

fn config(url: String) -> Config {
    let mut config = Config::default();
    config.endpoint.url = url;
    config.endpoint.timeout_secs = 5;
    config.refresh.retry_backoff_ms = 10;
    config.entities.push(EntityConfig {
        id: "zurich".to_string(),
        municipality_uri: MUNI.to_string(),
        municipality_label: "Zürich".to_string(),
        year: 2024,
        update_interval_hours: 24,
    });
    config
}

async fn mock_cube(server: &mut mockito::ServerGuard) -> (mockito::Mock, mockito::Mock) {
    // discovery samples filter on ?yv, the observation fetch on ?y
    let discovery = server
        .mock("POST", "/query")
        .match_body(Matcher::Regex(r"\?yv".to_string()))
        .with_status(200)
        .with_header("content-type", "application/sparql-results+json")
        .with_body(cube_body())
        .create_async()
        .await;
    let fetch = server
        .mock("POST", "/query")
        .match_body(Matcher::Regex(r"STR\(\?y\)".to_string()))
        .with_status(200)
        .with_header("content-type", "application/sparql-results+json")
        .with_body(cube_body())
        .create_async()
        .await;
    (discovery, fetch)
}

#[tokio::test]
async fn refresh_once_maps_cube_over_http() {
    let mut server = Server::new_async().await;
    let (discovery, fetch) = mock_cube(&mut server).await;

    let config = config(format!("{}/query", server.url()));
    let client = SparqlClient::from_config(&config.endpoint).unwrap();
    let pipeline = TariffPipeline::new(client, &config);
    let result = pipeline.refresh_once(&config.entities[0]).await.unwrap();

    assert_eq!(result.year, 2024);
    assert_eq!(result.municipality.uri, MUNI);

    let energy = result.component(PriceKind::Energy).unwrap();
    assert_eq!(energy.value, 0.12);
    assert_eq!(energy.unit, PriceUnit::ChfPerKwh);
    assert_eq!(energy.source_observation_id, "https://ex.org/obs/household");

    assert_eq!(result.component(PriceKind::Total).unwrap().value, 0.275);
    assert_eq!(result.component(PriceKind::Grid).unwrap().value, 0.095);
    assert_eq!(result.component(PriceKind::Fees).unwrap().value, 0.025);
    assert!(result.component(PriceKind::Metering).is_none());
    assert_eq!(result.raw_observation_ids.len(), 2);

    discovery.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn coordinator_publishes_report() {
    let mut server = Server::new_async().await;
    let _mocks = mock_cube(&mut server).await;

    let config = config(format!("{}/query", server.url()));
    let client = SparqlClient::from_config(&config.endpoint).unwrap();
    let pipeline = Arc::new(TariffPipeline::new(client, &config));
    let registry = CoordinatorRegistry::start(&config.entities, pipeline, &config.refresh);

    let handle = registry.get("zurich").unwrap();
    handle
        .subscribe_status()
        .wait_for(|s| s.state == RefreshState::Succeeded)
        .await
        .unwrap();

    let report = current_report(handle);
    let energy = report.reading(PriceKind::Energy).unwrap();
    assert_eq!(energy.name, "Swiss Tariff Zürich Energy Price");
    assert_eq!(energy.state.value(), Some(0.12));
    assert_eq!(report.attributes.source, "ElCom/LINDAS");
    assert!(report.attributes.last_update.as_deref().unwrap().ends_with('Z'));

    registry.shutdown_all().await;
}

#[tokio::test]
async fn coordinator_reports_transport_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/query")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let config = config(format!("{}/query", server.url()));
    let client = SparqlClient::from_config(&config.endpoint).unwrap();
    let pipeline = Arc::new(TariffPipeline::new(client, &config));
    let registry = CoordinatorRegistry::start(&config.entities, pipeline, &config.refresh);

    let handle = registry.get("zurich").unwrap();
    let status = handle
        .subscribe_status()
        .wait_for(|s| s.state == RefreshState::Failed)
        .await
        .unwrap()
        .clone();

    assert_eq!(status.last_error_kind.as_deref(), Some("transport"));
    assert!(!status.available);
    assert!(handle.snapshot().is_none());
    registry.shutdown_all().await;
}
