#![cfg(test)]

use super::config::*;

fn entity() -> EntityConfig {
    EntityConfig {
        id: "home".to_string(),
        municipality_uri: "https://ld.admin.ch/municipality/261".to_string(),
        municipality_label: String::new(),
        year: 2024,
        update_interval_hours: 24,
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.endpoint.url, "https://lindas.admin.ch/query");
    assert_eq!(
        config.endpoint.named_graph,
        "https://lindas.admin.ch/elcom/electricityprice"
    );
    assert_eq!(config.profile_priority.first().map(String::as_str), Some("household"));
    assert_eq!(config.refresh.max_retries, 2);
    assert!(config.entities.is_empty());
}

#[test]
fn test_entity_validation() {
    assert!(entity().validate().is_ok());

    let mut e = entity();
    e.id = " ".to_string();
    assert!(e.validate().is_err());

    e = entity();
    e.municipality_uri.clear();
    assert!(e.validate().is_err());

    e = entity();
    e.update_interval_hours = 0;
    assert!(e.validate().is_err());
}

#[test]
fn test_display_label_falls_back_to_uri() {
    let mut e = entity();
    assert_eq!(e.display_label(), e.municipality_uri);
    e.municipality_label = "Zürich".to_string();
    assert_eq!(e.display_label(), "Zürich");
}

#[test]
fn test_config_serialization() {
    let mut config = Config::default();
    config.entities.push(entity());
    let yaml = serde_yaml::to_string(&config).unwrap();
    let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(deserialized.entities, config.entities);
    assert_eq!(config.entity("home"), Some(&config.entities[0]));
    assert!(config.entity("away").is_none());
}
