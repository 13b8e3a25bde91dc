//! The config is process-wide, so everything touching it lives in this one
//! test binary and runs as a single test.

use modelgraph::config::{self, Config};
use modelgraph::{AttributeReflection, Model, ModelClass, Type, Value};
use serde_json::json;

#[test]
fn test_process_wide_config() {
    let class = ModelClass::builder("BookShelf")
        .primary_key(Type::Integer)
        .attribute(AttributeReflection::localized("title", Type::String))
        .build()
        .unwrap();
    let shelf = Model::new(&class, json!({"id": 1, "title_translations": {"en": "Shelf", "de": "Regal"}}))
        .unwrap();

    // Localized reads follow the locale chain.
    assert_eq!(shelf.get("title").unwrap(), Value::from("Shelf"));
    config::set(Config {
        locale: "de".to_string(),
        ..Config::default()
    });
    assert_eq!(shelf.get("title").unwrap(), Value::from("Regal"));

    config::set(Config {
        locale: "fr".to_string(),
        locale_fallbacks: vec!["en".to_string()],
        ..Config::default()
    });
    assert_eq!(shelf.get("title").unwrap(), Value::from("Shelf"));
    shelf.set("title", "Étagère").unwrap();
    assert_eq!(shelf.get("title").unwrap(), Value::from("Étagère"));
    assert_eq!(
        shelf.get("title_translations").unwrap(),
        Value::from(json!({"en": "Shelf", "de": "Regal", "fr": "Étagère"}))
    );

    // Root key in JSON output.
    config::set(Config {
        include_root_in_json: true,
        ..Config::default()
    });
    let json = shelf.as_json().unwrap();
    assert_eq!(json["book_shelf"]["id"], json!(1));

    // Configured primary attribute name.
    config::set(Config {
        primary_attribute: "key".to_string(),
        ..Config::default()
    });
    let keyed = ModelClass::builder("Keyed").primary_key(Type::Integer).build().unwrap();
    assert_eq!(keyed.primary_attribute().unwrap().name(), "key");

    config::set(Config::default());
    let temp_dir = tempfile::tempdir().unwrap();
    let stored = Config {
        locale_fallbacks: vec!["en".to_string()],
        ..Config::default()
    };
    stored.save(temp_dir.path()).unwrap();
    assert_eq!(Config::load(temp_dir.path()).unwrap(), stored);
}
