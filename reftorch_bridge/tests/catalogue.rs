use std::collections::HashSet;

use reftorch_bridge::catalogue::catalogue_json;
use reftorch_bridge::{lookup, OperandKind, Returns, CATALOGUE};

#[test]
fn names_are_unique_and_indexed() {
    let mut seen = HashSet::new();
    for spec in CATALOGUE {
        assert!(seen.insert(spec.name), "duplicate {}", spec.name);
        let found = lookup(spec.name).expect("indexed");
        assert_eq!(found.name, spec.name);
    }
    assert!(lookup("tadd").is_none());
}

#[test]
fn variable_length_operands_come_last() {
    for spec in CATALOGUE {
        let n = spec.operands.len();
        for (i, kind) in spec.operands.iter().enumerate() {
            if kind.must_be_last() {
                assert_eq!(i + 1, n, "{} puts {} before other operands", spec.name, kind);
            }
        }
    }
}

#[test]
fn in_place_training_ops_return_nothing() {
    for name in ["TSgdStep", "TFill", "TRequiresGrad", "TFree", "TSave"] {
        assert_eq!(lookup(name).unwrap().returns, Returns::Nothing, "{}", name);
    }
    let allclose = lookup("TAllClose").unwrap();
    assert!(matches!(
        allclose.operands.last(),
        Some(OperandKind::Real(reftorch_bridge::Scale::Micro))
    ));
}

#[test]
fn json_lists_every_operation() {
    let json = catalogue_json().expect("serialize");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    let entries = parsed.as_array().expect("array");
    assert_eq!(entries.len(), CATALOGUE.len());
    let add = entries
        .iter()
        .find(|e| e["name"] == "TAdd")
        .expect("TAdd present");
    assert_eq!(add["family"], "elementwise");
    assert_eq!(add["operands"], serde_json::json!(["handle", "handle"]));
}
