//! End-to-end prediction tests: parse a JSON model description, build the
//! ensemble, and verify combined predictions across combination methods and
//! missing strategies.

use std::collections::HashMap;

use serde_json::json;

use ensembler::describe::ModelDescription;
use ensembler::multivote::{CombinationMethod, Combined};
use ensembler::tree::MissingStrategy;

// =============================================================================
// Fixtures
// =============================================================================

/// Three single-split trees over one numeric feature, voting yes/no.
fn standard_description() -> ModelDescription {
    let stump = |threshold: f64| {
        json!({
            "root": {
                "predicate": true,
                "output": "no",
                "confidence": 0.5,
                "count": 20,
                "distribution": [["no", 11], ["yes", 9]],
                "children": [
                    {"predicate": {"operator": "<=", "field": "000001", "value": threshold},
                     "output": "no", "confidence": 0.7, "count": 10,
                     "distribution": [["no", 8], ["yes", 2]]},
                    {"predicate": {"operator": ">", "field": "000001", "value": threshold},
                     "output": "yes", "confidence": 0.8, "count": 10,
                     "distribution": [["no", 3], ["yes", 7]]}
                ]
            }
        })
    };
    serde_json::from_value(json!({
        "objective_field": "000002",
        "fields": {
            "000001": {"name": "balance", "optype": "numeric"},
            "000002": {"name": "churn", "optype": "categorical"}
        },
        "models": [stump(1.0), stump(2.0), stump(3.0)]
    }))
    .expect("parse description")
}

/// Two boosted regression stumps with a scalar offset.
fn boosted_regression_description() -> ModelDescription {
    serde_json::from_value(json!({
        "objective_field": "000002",
        "fields": {
            "000001": {"name": "balance", "optype": "numeric"},
            "000002": {"name": "amount", "optype": "numeric"}
        },
        "boosting": {"lambda": 0.1, "offset": 100.0},
        "models": [
            {"weight": 0.5, "root": {
                "predicate": true, "output": 0.0, "g_sum": 0.0, "h_sum": 0.0, "count": 20,
                "children": [
                    {"predicate": {"operator": "<=", "field": "000001", "value": 1.0},
                     "output": -4.0, "g_sum": 4.0, "h_sum": 9.9, "count": 10},
                    {"predicate": {"operator": ">", "field": "000001", "value": 1.0},
                     "output": 6.0, "g_sum": -6.0, "h_sum": 0.9, "count": 10}
                ]
            }},
            {"weight": 0.5, "root": {
                "predicate": true, "output": 2.0, "g_sum": -2.0, "h_sum": 0.9, "count": 20
            }}
        ]
    }))
    .expect("parse description")
}

fn input(value: f64) -> HashMap<String, serde_json::Value> {
    HashMap::from([("balance".to_string(), json!(value))])
}

// =============================================================================
// Standard ensembles
// =============================================================================

#[test]
fn plurality_prediction() {
    let ensemble = standard_description().build().expect("build ensemble");
    let combined = ensemble
        .predict(&input(2.5), None, MissingStrategy::LastPrediction)
        .expect("predict");
    // Above two thresholds of three: yes, yes, no.
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "yes"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn confidence_weighted_prediction() {
    let ensemble = standard_description().build().expect("build ensemble");
    let combined = ensemble
        .predict(
            &input(2.5),
            Some(CombinationMethod::Confidence),
            MissingStrategy::LastPrediction,
        )
        .expect("predict");
    match combined {
        Combined::Category {
            prediction,
            confidence,
        } => {
            // Two yes votes at 0.8 against one no vote at 0.7.
            assert_eq!(prediction, "yes");
            assert_eq!(confidence, 0.8);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn probability_weighted_prediction() {
    let ensemble = standard_description().build().expect("build ensemble");
    let combined = ensemble
        .predict(
            &input(0.5),
            Some(CombinationMethod::Probability),
            MissingStrategy::LastPrediction,
        )
        .expect("predict");
    // All three trees land on the low leaf with distribution {no: 8, yes: 2}.
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "no"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn threshold_prediction_falls_back_to_rest() {
    let ensemble = standard_description().build().expect("build ensemble");
    let combined = ensemble
        .predict(
            &input(2.5),
            Some(CombinationMethod::Threshold {
                k: 3,
                category: "yes".to_string(),
            }),
            MissingStrategy::LastPrediction,
        )
        .expect("predict");
    // Only two of three trees vote yes, below the threshold: the remaining
    // votes decide.
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "no"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn missing_input_stops_at_root() {
    let ensemble = standard_description().build().expect("build ensemble");
    let combined = ensemble
        .predict(&HashMap::new(), None, MissingStrategy::LastPrediction)
        .expect("predict");
    // No tree can resolve its split: every root votes its own output.
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "no"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn in_predicate_routes_on_list_membership() {
    let description: ModelDescription = serde_json::from_value(json!({
        "objective_field": "000002",
        "fields": {
            "000001": {"name": "color", "optype": "categorical"},
            "000002": {"name": "churn", "optype": "categorical"}
        },
        "models": [{
            "root": {
                "predicate": true,
                "output": "no",
                "confidence": 0.5,
                "count": 20,
                "children": [
                    {"predicate": {"operator": "in", "field": "000001", "value": ["red", "blue"]},
                     "output": "yes", "confidence": 0.8, "count": 10},
                    {"predicate": {"operator": "!=", "field": "000001", "value": ["red", "blue"]},
                     "output": "no", "confidence": 0.7, "count": 10}
                ]
            }
        }]
    }))
    .expect("parse description");
    let ensemble = description.build().expect("build ensemble");

    let member = HashMap::from([("color".to_string(), json!("blue"))]);
    let combined = ensemble
        .predict(&member, None, MissingStrategy::LastPrediction)
        .expect("predict");
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "yes"),
        other => panic!("unexpected result: {:?}", other),
    }

    let outsider = HashMap::from([("color".to_string(), json!("green"))]);
    let combined = ensemble
        .predict(&outsider, None, MissingStrategy::LastPrediction)
        .expect("predict");
    match combined {
        Combined::Category { prediction, .. } => assert_eq!(prediction, "no"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn repeated_prediction_is_deterministic() {
    let ensemble = standard_description().build().expect("build ensemble");
    let first = ensemble
        .predict(&input(2.5), None, MissingStrategy::LastPrediction)
        .expect("predict");
    for _ in 0..10 {
        let again = ensemble
            .predict(&input(2.5), None, MissingStrategy::LastPrediction)
            .expect("predict");
        assert_eq!(first, again);
    }
}

// =============================================================================
// Boosted ensembles
// =============================================================================

#[test]
fn boosted_regression_last_prediction() {
    let ensemble = boosted_regression_description()
        .build()
        .expect("build ensemble");
    assert!(ensemble.is_boosted());
    let combined = ensemble
        .predict(&input(2.0), None, MissingStrategy::LastPrediction)
        .expect("predict");
    // 0.5 * 6.0 + 0.5 * 2.0 + offset 100.
    match combined {
        Combined::Numeric { prediction, .. } => {
            assert!((prediction - 104.0).abs() < 1e-9);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn boosted_regression_proportional_merges_missing_split() {
    let ensemble = boosted_regression_description()
        .build()
        .expect("build ensemble");
    let combined = ensemble
        .predict(&HashMap::new(), None, MissingStrategy::Proportional)
        .expect("predict");
    // First tree merges both leaves: -(4 - 6) / (9.9 + 0.9 + 0.1) = 2/10.9.
    // Second tree is a single leaf: -(-2) / (0.9 + 0.1) = 2.
    let first = 2.0 / 10.9;
    let second = 2.0;
    let expected = 0.5 * first + 0.5 * second + 100.0;
    match combined {
        Combined::Numeric { prediction, .. } => {
            assert!((prediction - expected).abs() < 1e-9);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
