//! Integration tests for the complete calgraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - question → rule planner → validator → compiler
//! - compiled query → fixture executor → summarizer
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeMap;

use serde_json::json;

use calgraph_cypher::{compile, summarize, AnswerIntent, Row};
use calgraph_plan::{rule_plan, validate_plan, Plan, PlanError, SchemaRegistry};
use calgraph_store::ExecutorBackend;

fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// Question → plan → Cypher
// ============================================================================

#[test]
fn weekday_question_compiles_to_a_weekday_query() {
    let registry = SchemaRegistry::builtin();
    let raw = serde_json::to_value(rule_plan(
        "Which events start on a Monday in Fall 2025?",
        &registry,
        None,
    ))
    .expect("serialize");
    let normalized = validate_plan(&registry, &raw).expect("valid");
    let plan = normalized.plan.as_query().expect("query plan");

    let compiled = compile(plan);
    assert!(compiled.text.contains("e.start_weekday = $weekday"));
    assert_eq!(compiled.params.get("weekday"), Some(&json!("Monday")));
    assert_eq!(compiled.params.get("term"), Some(&json!("Fall 2025")));
}

#[test]
fn anchor_question_normalizes_the_synonym_before_compiling() {
    let registry = SchemaRegistry::builtin();
    let raw = json!({
        "intent": "query",
        "term": "Fall 2025",
        "filters": [{"type": "after_anchor", "anchor_event": "Classes Start"}]
    });
    let normalized = validate_plan(&registry, &raw).expect("valid");
    let plan = normalized.plan.as_query().expect("query plan");

    let compiled = compile(plan);
    assert_eq!(compiled.params.get("anchor"), Some(&json!("Classes Begin")));
    assert!(compiled.text.contains("e.start_date > anchor_date"));
    assert!(compiled.text.ends_with("ORDER BY e.start_date ASC\n"));
}

#[test]
fn questions_without_a_term_never_reach_the_compiler() {
    let registry = SchemaRegistry::builtin();
    let plan = rule_plan("what events overlap?", &registry, None);
    assert_eq!(plan, Plan::needs_term());
}

#[test]
fn plans_without_an_intent_fail_validation() {
    let registry = SchemaRegistry::builtin();
    let err = validate_plan(&registry, &json!({"term": "Fall 2025"})).expect_err("no intent");
    assert_eq!(err, PlanError::MissingIntent);
}

// ============================================================================
// Compiled query → rows → summary
// ============================================================================

#[test]
fn full_pipeline_over_the_fixture_executor() {
    let registry = SchemaRegistry::builtin();
    let question = "What overlaps in Fall 2025?";
    let raw = serde_json::to_value(rule_plan(question, &registry, None)).expect("serialize");
    let normalized = validate_plan(&registry, &raw).expect("valid");
    let plan = normalized.plan.as_query().expect("query plan");
    let compiled = compile(plan);
    assert!(compiled.text.contains("a.start_date <= b.end_date"));

    let fixture = vec![row(&[
        ("event1", json!("Welcome Week")),
        ("a_start", json!("2025-09-01")),
        ("a_end", json!("2025-09-05")),
        ("event2", json!("Orientation")),
        ("b_start", json!("2025-09-03")),
        ("b_end", json!("2025-09-10")),
    ])];
    let rows = ExecutorBackend::Fixture(fixture).run(&compiled).expect("rows");

    let intent = AnswerIntent::from_plan(plan);
    assert_eq!(intent, AnswerIntent::OverlapPairs);
    let summary = summarize(question, &intent, &plan.term, &rows);
    assert!(summary.starts_with("There are 1 overlapping event pair row(s) in Fall 2025:"));
    assert!(summary.contains("'Welcome Week' (2025-09-01 to 2025-09-05) overlaps with 'Orientation'"));
}

#[test]
fn zero_rows_produce_the_not_found_summary() {
    let registry = SchemaRegistry::builtin();
    let question = "monday events in Fall 2025";
    let raw = serde_json::to_value(rule_plan(question, &registry, None)).expect("serialize");
    let normalized = validate_plan(&registry, &raw).expect("valid");
    let plan = normalized.plan.as_query().expect("query plan");

    let rows = ExecutorBackend::Fixture(Vec::new())
        .run(&compile(plan))
        .expect("rows");
    assert!(rows.is_empty());

    let summary = summarize(question, &AnswerIntent::from_plan(plan), &plan.term, &rows);
    assert!(summary.starts_with("No matching events"));
    assert!(summary.contains("Monday events in Fall 2025"));
}

#[test]
fn noisy_planner_output_degrades_to_a_broader_query() {
    let registry = SchemaRegistry::builtin();
    // A plausible LLM reply: one valid filter, one hallucinated.
    let raw = json!({
        "intent": "query",
        "term": "Fall 2025",
        "filters": [
            {"type": "weekday_in", "weekday": "Friday"},
            {"type": "fulltext_search", "query": "exams"}
        ],
        "order_by": [{"field": "relevance"}],
        "group_by": ["iso_week"],
        "extra_key": {"ignored": true}
    });
    let normalized = validate_plan(&registry, &raw).expect("valid");
    assert_eq!(normalized.dropped_filters, 1);
    let plan = normalized.plan.as_query().expect("query plan");

    let compiled = compile(plan);
    assert!(compiled.text.contains("e.start_weekday = $weekday"));
    assert!(!compiled.text.contains("fulltext"));
    assert!(compiled.text.contains("e.start_date.week AS iso_week"));
    // the disallowed order field fell away, leaving the default ordering
    assert!(compiled.text.ends_with("ORDER BY e.start_date ASC\n"));
}

// ============================================================================
// Pairwise de-duplication contract
// ============================================================================

#[test]
fn overlap_rows_are_never_duplicated_reversed() {
    // The executor contract: `id(a) < id(b)` yields one row per unordered
    // pair. The summarizer must preserve that count.
    let rows = vec![row(&[
        ("event1", json!("A")),
        ("a_start", json!("2025-09-01")),
        ("a_end", json!("2025-09-05")),
        ("event2", json!("B")),
        ("b_start", json!("2025-09-03")),
        ("b_end", json!("2025-09-10")),
    ])];
    let summary = summarize("overlaps?", &AnswerIntent::OverlapPairs, "Fall 2025", &rows);
    assert!(summary.contains("There are 1 overlapping event pair row(s)"));
    let mentions = summary.matches("overlaps with").count();
    assert_eq!(mentions, 1);
}

#[test]
fn config_files_drive_the_allow_lists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema_path = dir.path().join("schema.json");
    let syn_path = dir.path().join("synonyms.json");
    std::fs::write(
        &schema_path,
        r#"{"allow_filters":["weekday_in"],"allow_group_by":[],"allow_order_by":["start_date"]}"#,
    )
    .expect("write schema");
    std::fs::write(&syn_path, r#"{"anchors":{"classes begin":"Classes Begin"}}"#)
        .expect("write synonyms");

    let registry = SchemaRegistry::from_config_files(&schema_path, &syn_path).expect("load");
    let raw = json!({
        "intent": "query",
        "term": "Fall 2025",
        "filters": [
            {"type": "weekday_in", "weekday": "Monday"},
            {"type": "month_eq", "year": 2025, "month": 9}
        ]
    });
    let normalized = validate_plan(&registry, &raw).expect("valid");
    // month_eq is valid in the builtin registry but this deployment turned it off
    assert_eq!(normalized.dropped_filters, 1);
    let plan = normalized.plan.as_query().expect("query plan");
    assert_eq!(plan.filters.len(), 1);

    let compiled = compile(plan);
    let keys: Vec<&str> = compiled.params.keys().map(String::as_str).collect();
    assert_eq!(keys, ["term", "weekday"]);
}
