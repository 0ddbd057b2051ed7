//! The question pipeline: hints → plan → validate → compile → execute →
//! summarize → optional rewrite.
//!
//! Everything user-facing is printed here; the library crates stay silent
//! apart from tracing diagnostics.

use anyhow::{anyhow, Result};
use colored::Colorize;
use std::collections::BTreeMap;

use calgraph_cypher::{compile, summarize, AnswerIntent, CompiledQuery, Row};
use calgraph_llm::Planner;
use calgraph_plan::{extract_hints, validate_plan, Normalized, Plan, QueryPlan, SchemaRegistry};
use calgraph_store::ExecutorBackend;

use crate::{AskArgs, ConfigArgs, PlanArgs, PlannerKind};

pub(crate) fn run_ask(args: AskArgs) -> Result<()> {
    let registry = load_registry(&args.config)?;
    let question = args.question.join(" ");
    let planner = build_planner(args.planner, args.model.clone())?;

    let raw = planner.propose_raw(&registry, &question, args.fallback_year);
    let normalized =
        validate_plan(&registry, &raw).map_err(|e| anyhow!("planner error: {e}"))?;

    let query_plan = match &normalized.plan {
        Plan::AskClarification { missing } => {
            let missing: Vec<&str> = if missing.is_empty() {
                vec!["term"]
            } else {
                missing.iter().map(String::as_str).collect()
            };
            println!(
                "Need more info: please specify {} (e.g. 'Fall 2025').",
                missing.join(", ")
            );
            return Ok(());
        }
        Plan::Query(q) => q,
    };

    let compiled = compile(query_plan);
    if args.debug {
        print_debug(&normalized, &compiled);
    }

    let executor = build_executor()?;
    let rows = executor
        .run(&compiled)
        .map_err(|e| anyhow!("graph query failed: {e}"))?;
    if args.debug {
        println!("{}", "--- ROWS ---".bold());
        println!("{} row(s)\n", rows.len());
    }

    let intent = AnswerIntent::from_plan(query_plan);
    let summary = summarize(&question, &intent, &query_plan.term, &rows);

    let rewritten = if args.no_rewrite {
        None
    } else {
        match planner.rewrite(&question, &summary, &rows) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{} rewrite failed, using the factual summary: {err}", "warning:".yellow().bold());
                None
            }
        }
    };

    println!("{}", "=== ANSWER ===".bold());
    println!("{}", rewritten.as_deref().unwrap_or(&summary));

    if !rows.is_empty() {
        print_rows(query_plan, &intent, &rows);
    }
    Ok(())
}

pub(crate) fn run_plan(args: PlanArgs) -> Result<()> {
    let registry = load_registry(&args.config)?;
    let question = args.question.join(" ");

    let hints = extract_hints(&question, &registry, args.fallback_year);
    println!("{}", "--- HINTS ---".bold());
    println!("{}\n", serde_json::to_string_pretty(&hints)?);

    let raw = Planner::rules().propose_raw(&registry, &question, args.fallback_year);
    let normalized =
        validate_plan(&registry, &raw).map_err(|e| anyhow!("planner error: {e}"))?;

    match &normalized.plan {
        Plan::AskClarification { missing } => {
            println!(
                "Clarification needed: missing {}.",
                if missing.is_empty() {
                    "term".to_string()
                } else {
                    missing.join(", ")
                }
            );
        }
        Plan::Query(q) => {
            print_debug(&normalized, &compile(q));
        }
    }
    Ok(())
}

fn load_registry(config: &ConfigArgs) -> Result<SchemaRegistry> {
    match (&config.schema_config, &config.synonyms_config) {
        (Some(schema), Some(synonyms)) => SchemaRegistry::from_config_files(schema, synonyms)
            .map_err(|e| anyhow!("failed to load schema config: {e}")),
        (None, None) => Ok(SchemaRegistry::builtin()),
        _ => Err(anyhow!(
            "--schema-config and --synonyms-config must be given together"
        )),
    }
}

fn build_planner(kind: PlannerKind, model: Option<String>) -> Result<Planner> {
    match kind {
        PlannerKind::Rules => Ok(Planner::rules()),
        #[cfg(feature = "llm-ollama")]
        PlannerKind::Ollama => Ok(Planner::ollama_from_env(model)),
        #[cfg(feature = "llm-openai")]
        PlannerKind::Openai => Ok(Planner::openai_from_env(model)),
        #[cfg(feature = "llm-anthropic")]
        PlannerKind::Anthropic => Ok(Planner::anthropic_from_env(model)),
    }
}

#[cfg(feature = "neo4j-http")]
fn build_executor() -> Result<ExecutorBackend> {
    let config = calgraph_store::HttpConfig::from_env()
        .map_err(|e| anyhow!("executor configuration error: {e}"))?;
    Ok(ExecutorBackend::Http(config))
}

#[cfg(not(feature = "neo4j-http"))]
fn build_executor() -> Result<ExecutorBackend> {
    Err(anyhow!(
        "this build has no graph executor (enable the `neo4j-http` feature)"
    ))
}

fn print_debug(normalized: &Normalized, compiled: &CompiledQuery) {
    println!("{}", "--- PLAN ---".bold());
    match serde_json::to_string_pretty(&normalized.plan) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{:?}", normalized.plan),
    }
    if normalized.dropped_filters > 0 {
        println!(
            "{} {} unrecognized filter(s) dropped during validation",
            "note:".yellow().bold(),
            normalized.dropped_filters
        );
    }
    println!();
    println!("{}", "--- CYPHER ---".bold());
    println!("{}", compiled.text);
    println!("{}", "--- PARAMS ---".bold());
    match serde_json::to_string_pretty(&compiled.params) {
        Ok(pretty) => println!("{pretty}\n"),
        Err(_) => println!("{:?}\n", compiled.params),
    }
}

/// Print the rows under the answer: grouped by ISO week when the plan asked
/// for grouping, flat otherwise. Pairwise shapes are always flat.
fn print_rows(plan: &QueryPlan, intent: &AnswerIntent, rows: &[Row]) {
    let pairwise = matches!(
        intent,
        AnswerIntent::SameDayPairs | AnswerIntent::OverlapPairs
    );
    let grouped = !pairwise
        && plan
            .group_by
            .iter()
            .any(|g| g == "iso_week" || g == "iso_year");

    if !grouped {
        println!("\n{}", "(Results)".bold());
        println!("{}", render_table(rows, &[]));
        return;
    }

    println!("\n{}", "(Results grouped by ISO week)".bold());
    let mut groups: BTreeMap<(i64, i64), Vec<Row>> = BTreeMap::new();
    for row in rows {
        let year = row
            .get("iso_year")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default();
        let week = row
            .get("iso_week")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default();
        groups.entry((year, week)).or_default().push(row.clone());
    }
    for ((year, week), block) in &groups {
        println!("\n{}", format!("Week {week}, {year}").bold());
        println!("{}", render_table(block, &["iso_year", "iso_week"]));
    }
}

/// Fixed-width text table. Column order prefers the well-known result
/// columns; anything else follows in name order.
fn render_table(rows: &[Row], skip: &[&str]) -> String {
    const PREFERRED: [&str; 12] = [
        "name",
        "start_date",
        "end_date",
        "weekday",
        "source",
        "date",
        "event1",
        "a_start",
        "a_end",
        "event2",
        "b_start",
        "b_end",
    ];
    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut columns: Vec<String> = Vec::new();
    for c in PREFERRED {
        if first.contains_key(c) && !skip.contains(&c) {
            columns.push(c.to_string());
        }
    }
    for key in first.keys() {
        if !columns.iter().any(|c| c == key) && !skip.contains(&key.as_str()) {
            columns.push(key.clone());
        }
    }

    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for row in rows {
        let line: Vec<String> = columns.iter().map(|c| cell(row, c)).collect();
        for (i, value) in line.iter().enumerate() {
            widths[i] = widths[i].max(value.len());
        }
        cells.push(line);
    }

    let mut out = String::new();
    for (i, col) in columns.iter().enumerate() {
        out.push_str(&format!("{:<width$}  ", col, width = widths[i]));
    }
    out.push('\n');
    for width in &widths {
        out.push_str(&"-".repeat(*width));
        out.push_str("  ");
    }
    out.push('\n');
    for line in cells {
        for (i, value) in line.iter().enumerate() {
            out.push_str(&format!("{:<width$}  ", value, width = widths[i]));
        }
        out.push('\n');
    }
    out
}

fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
