//! The `classreg` binary's flow: load config, run script files in one
//! sandbox, then render the registry as a tree or as JSON

use std::io::Write;
use std::sync::Arc;

use classreg::lua::Sandbox;
use classreg::{ClassRegistry, Config};

fn script(code: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", code).unwrap();
    file
}

#[test]
fn test_scripts_then_tree_and_json() {
    let config = Config::default();
    let registry = Arc::new(ClassRegistry::new());
    let mut sandbox = Sandbox::new(config.sandbox.clone(), registry.clone()).unwrap();

    let first = script(r#"class("Vehicle"); class("Car", "Vehicle")"#);
    let second = script(r#"class("Truck", "Vehicle"); class("Pickup", "Truck"); class("Road")"#);

    for file in [&first, &second] {
        let source = std::fs::read_to_string(file.path()).unwrap();
        sandbox
            .execute_named(&file.path().display().to_string(), &source)
            .unwrap();
    }

    assert_eq!(
        registry.render_tree(),
        "Road\nVehicle\n  Car\n  Truck\n    Pickup\n"
    );

    let json = serde_json::to_value(registry.describe_all()).unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|class| class["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Car", "Pickup", "Road", "Truck", "Vehicle"]);
    assert_eq!(json[1]["parent"], "Truck");
    assert!(json[2]["parent"].is_null());
}

#[test]
fn test_failing_script_names_the_file() {
    let registry = Arc::new(ClassRegistry::new());
    let mut sandbox = Sandbox::new(Config::default().sandbox, registry.clone()).unwrap();

    let bad = script(r#"class("Lonely", "Missing")"#);
    let name = bad.path().display().to_string();
    let source = std::fs::read_to_string(bad.path()).unwrap();

    let err = sandbox.execute_named(&name, &source).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Missing"), "{}", message);
    assert!(registry.is_empty());
    assert_eq!(registry.render_tree(), "");
}
