//! Property tests for the plan validator: total over arbitrary JSON, and
//! idempotent over its own output.

use proptest::prelude::*;
use serde_json::{json, Value};

use calgraph_plan::{validate_plan, Plan, PlanError, SchemaRegistry};

fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(depth, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
            prop::collection::btree_map("[a-z_]{1,12}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Raw plans that look plausibly planner-shaped: correct top-level keys with
/// noisy contents.
fn arb_planner_shaped() -> impl Strategy<Value = Value> {
    let filter = prop_oneof![
        Just(json!({"type": "weekday_in", "weekday": "Monday"})),
        Just(json!({"type": "month_eq", "year": 2025, "month": 9})),
        Just(json!({"type": "month_eq", "year": 2025, "month": 0})),
        Just(json!({"type": "same_day_pairs"})),
        Just(json!({"type": "mystery_filter", "x": 1})),
        Just(json!({"type": "after_anchor", "anchor_event": "classes end"})),
        Just(json!("garbage")),
    ];
    (
        prop::option::of(prop_oneof![
            Just("query".to_string()),
            Just("ask_clarification".to_string()),
            Just("something_else".to_string())
        ]),
        prop::option::of("[a-zA-Z0-9 ]{0,16}"),
        prop::collection::vec(filter, 0..5),
        prop::collection::vec("[a-z_]{1,10}", 0..4),
    )
        .prop_map(|(intent, term, filters, group_by)| {
            let mut obj = serde_json::Map::new();
            if let Some(intent) = intent {
                obj.insert("intent".to_string(), Value::from(intent));
            }
            if let Some(term) = term {
                obj.insert("term".to_string(), Value::from(term));
            }
            obj.insert("filters".to_string(), Value::from(filters));
            obj.insert(
                "group_by".to_string(),
                Value::from(group_by),
            );
            Value::Object(obj)
        })
}

proptest! {
    #[test]
    fn never_panics_on_arbitrary_json(raw in arb_json(4)) {
        let registry = SchemaRegistry::builtin();
        // Either MissingIntent or a well-formed plan; nothing else.
        match validate_plan(&registry, &raw) {
            Err(PlanError::MissingIntent) => {}
            Ok(n) => match n.plan {
                Plan::AskClarification { .. } => {}
                Plan::Query(q) => {
                    prop_assert!(!q.term.trim().is_empty());
                    prop_assert!(!q.select.is_empty());
                }
            },
        }
    }

    #[test]
    fn normalized_plans_revalidate_to_themselves(raw in arb_planner_shaped()) {
        let registry = SchemaRegistry::builtin();
        if let Ok(first) = validate_plan(&registry, &raw) {
            let reserialized = serde_json::to_value(&first.plan).expect("serialize");
            let second = validate_plan(&registry, &reserialized).expect("revalidate");
            prop_assert_eq!(second.plan, first.plan);
            prop_assert_eq!(second.dropped_filters, 0);
        }
    }

    #[test]
    fn query_plans_contain_only_allowed_vocabulary(raw in arb_planner_shaped()) {
        let registry = SchemaRegistry::builtin();
        if let Ok(n) = validate_plan(&registry, &raw) {
            if let Plan::Query(q) = n.plan {
                for f in &q.filters {
                    prop_assert!(registry.filter_allowed(f.kind()));
                }
                for g in &q.group_by {
                    prop_assert!(registry.group_key_allowed(g));
                }
                for ob in &q.order_by {
                    prop_assert!(registry.order_field_allowed(&ob.field));
                }
            }
        }
    }
}
