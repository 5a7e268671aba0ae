//! Integration tests for the process-wide class registry
//!
//! Every test uses its own class names because the global registry is
//! shared by all tests in this binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use classreg::objects::INITIALIZE;
use classreg::{
    define_class, get_descriptor, instantiate_blank, is_instance_of, type_of, ClassError,
    ClassRegistry, Value,
};

#[test]
fn test_define_then_get_descriptor() {
    define_class("GlobalPoint", None).unwrap();
    let class = get_descriptor("GlobalPoint").unwrap();
    assert_eq!(class.name(), "GlobalPoint");
    assert_eq!(class.version(), 1);
    assert!(get_descriptor("GlobalNowhere").is_none());
}

#[test]
fn test_global_duplicate_is_rejected() {
    define_class("GlobalOnce", None).unwrap();
    let before = ClassRegistry::global().describe("GlobalOnce");

    assert_eq!(
        define_class("GlobalOnce", None).unwrap_err(),
        ClassError::DuplicateClass("GlobalOnce".to_string())
    );
    assert_eq!(ClassRegistry::global().describe("GlobalOnce"), before);
}

#[test]
fn test_global_unknown_parent() {
    assert_eq!(
        define_class("GlobalOrphan", Some("GlobalMissingParent")).unwrap_err(),
        ClassError::UnknownParent("GlobalMissingParent".to_string())
    );
    assert!(get_descriptor("GlobalOrphan").is_none());
    assert!(!ClassRegistry::global().exists("GlobalOrphan"));
}

#[test]
fn test_global_chain_membership() {
    let a = define_class("ChainA", None).unwrap();
    define_class("ChainB", Some("ChainA")).unwrap();
    let c = define_class("ChainC", Some("ChainB")).unwrap();

    let a = Value::from(a.call(&[]).unwrap());
    let c = Value::from(c.call(&[]).unwrap());

    assert!(is_instance_of(&c, "ChainA"));
    assert!(is_instance_of(&c, "ChainB"));
    assert!(is_instance_of(&c, "ChainC"));
    assert!(!is_instance_of(&a, "ChainC"));
    assert!(!is_instance_of(&a, "ChainB"));
    assert_eq!(type_of(&c), "ChainC");
}

#[test]
fn test_global_intrinsics() {
    define_class("IntrinsicA", None).unwrap();
    assert_eq!(type_of(&Value::from(42)), "number");
    assert!(is_instance_of(&Value::from(42), "number"));
    assert!(!is_instance_of(&Value::from(42), "IntrinsicA"));
}

#[test]
fn test_global_blank_instance() {
    let handle = define_class("GlobalBlank", None).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    handle
        .define_method(INITIALIZE, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Nil)
        })
        .unwrap();

    let blank = instantiate_blank("GlobalBlank").unwrap();
    assert_eq!(type_of(&Value::from(blank)), "GlobalBlank");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    handle.call(&[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        instantiate_blank("GlobalNoSuchClass").unwrap_err(),
        ClassError::UnknownClass("GlobalNoSuchClass".to_string())
    );
}

#[test]
fn test_global_inheritance_scenario() {
    let a = define_class("ScenarioA", None).unwrap();
    a.define_method(INITIALIZE, |this, args| {
        this.set("stuff", args.first().cloned().unwrap_or_default());
        Ok(Value::Nil)
    })
    .unwrap();

    let b = define_class("ScenarioB", Some("ScenarioA")).unwrap();
    let parent = a.clone();
    b.define_method(INITIALIZE, move |this, args| {
        parent.call_method(INITIALIZE, this, args)?;
        this.set("level", 2);
        Ok(Value::Nil)
    })
    .unwrap();

    let obj = b.call(&[Value::from("x")]).unwrap();
    assert_eq!(obj.get_string("stuff").as_deref(), Some("x"));
    assert_eq!(obj.get_i64("level"), Some(2));

    let value = Value::from(obj);
    assert_eq!(type_of(&value), "ScenarioB");
    assert!(is_instance_of(&value, "ScenarioA"));
}

#[test]
fn test_local_registries_are_independent() {
    let local = ClassRegistry::new();
    local.define_class("IsolatedOnly", None).unwrap();
    assert!(get_descriptor("IsolatedOnly").is_none());

    define_class("SharedName", None).unwrap();
    assert!(local.define_class("SharedName", None).is_ok());
}

#[test]
fn test_class_info_serializes() {
    let base = define_class("JsonBase", None).unwrap();
    base.define_method("render", |_, _| Ok(Value::Nil)).unwrap();
    define_class("JsonLeaf", Some("JsonBase")).unwrap();

    let info = ClassRegistry::global().describe("JsonLeaf").unwrap();
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["name"], "JsonLeaf");
    assert_eq!(json["parent"], "JsonBase");
    assert_eq!(json["version"], 1);
    assert!(json["all_methods"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "render"));
}
