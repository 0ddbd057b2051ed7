//! Compiles a normalized [`QueryPlan`] into Cypher text plus named parameters.
//!
//! Shape of the generated queries:
//! - every query is anchored on the term: `(:Term {name:$term})-[:HAS_EVENT]->`
//! - anchor-relative plans match the anchor event first and carry its start
//!   date into a second match over the term's events;
//! - the pairwise kinds (`same_day_pairs`, `overlap_pairs`) replace the whole
//!   query with a self-join shape and ignore every other filter, with
//!   `id(a) < id(b)` keeping each unordered pair unique.
//!
//! All user-influenced values travel as parameters; the text itself is
//! assembled only from fixed fragments.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{json, Value};

use calgraph_plan::{Direction, Filter, OrderBy, QueryPlan};

/// One result row: column name → scalar value, as decoded from the executor.
pub type Row = BTreeMap<String, Value>;

/// Cypher text plus its parameter bindings. Consumed exactly once by an
/// executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    pub params: BTreeMap<String, Value>,
}

const BASE_MATCH: &str = "MATCH (:Term {name:$term})-[:HAS_EVENT]->(e:Event)\n";

const ANCHOR_MATCH: &str = "MATCH (:Term {name:$term})-[:HAS_EVENT]->(a:Event {name:$anchor})\n\
                            WITH a.start_date AS anchor_date\n\
                            MATCH (:Term {name:$term})-[:HAS_EVENT]->(e:Event)\n";

/// Total over normalized plans: anything validation lets through compiles.
pub fn compile(plan: &QueryPlan) -> CompiledQuery {
    // Pairwise kinds short-circuit the entire query shape; same-day wins when
    // both are present.
    if plan.filters.iter().any(|f| matches!(f, Filter::SameDayPairs)) {
        return same_day_pairs(&plan.term);
    }
    if plan.filters.iter().any(|f| matches!(f, Filter::OverlapPairs)) {
        return overlap_pairs(&plan.term);
    }

    let mut params: BTreeMap<String, Value> = BTreeMap::new();
    params.insert("term".to_string(), json!(plan.term));

    let mut clauses: Vec<String> = Vec::new();

    // The first anchor filter names the anchor; later anchor filters only
    // contribute their directional clause against the same anchor date.
    let prelude = match plan.filters.iter().find_map(|f| f.anchor_event()) {
        Some(anchor) => {
            params.insert("anchor".to_string(), json!(anchor));
            for f in &plan.filters {
                match f {
                    Filter::AfterAnchor { .. } => {
                        clauses.push("e.start_date > anchor_date".to_string());
                    }
                    Filter::BeforeAnchor { .. } => {
                        clauses.push("e.start_date < anchor_date".to_string());
                    }
                    Filter::AnchorExact { .. } => {
                        clauses.push("e.name = $anchor".to_string());
                    }
                    _ => {}
                }
            }
            ANCHOR_MATCH
        }
        None => BASE_MATCH,
    };

    for f in &plan.filters {
        match f {
            Filter::WeekdayIn { weekday } => {
                params.insert("weekday".to_string(), json!(weekday));
                clauses.push("e.start_weekday = $weekday".to_string());
            }
            Filter::MonthEq { year, month } => {
                if let Some((start, end)) = month_window(*year, *month) {
                    params.insert("start".to_string(), json!(start));
                    params.insert("end".to_string(), json!(end));
                    clauses.push(
                        "e.start_date >= date($start) AND e.start_date < date($end)".to_string(),
                    );
                }
            }
            Filter::DateWindow { start, end } => {
                params.insert("win_start".to_string(), json!(start));
                params.insert("win_end".to_string(), json!(end));
                clauses.push(
                    "e.start_date >= date($win_start) AND e.start_date <= date($win_end)"
                        .to_string(),
                );
            }
            _ => {}
        }
    }

    let where_str = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}\n", clauses.join(" AND "))
    };

    let mut return_cols: Vec<String> = Vec::new();
    for col in &plan.select {
        match col.as_str() {
            "name" => return_cols.push("e.name AS name".to_string()),
            "start_date" | "end_date" => {
                return_cols.push(format!("toString(e.{col}) AS {col}"));
            }
            "source" => return_cols.push("e.source AS source".to_string()),
            _ => {}
        }
    }
    if return_cols.is_empty() {
        return_cols = vec![
            "e.name AS name".to_string(),
            "toString(e.start_date) AS start_date".to_string(),
            "toString(e.end_date) AS end_date".to_string(),
            "e.source AS source".to_string(),
        ];
    }

    // ISO pseudo-columns ride along in the plan's requested group order;
    // grouping itself happens client-side over these columns.
    for key in &plan.group_by {
        match key.as_str() {
            "iso_week" => return_cols.push("e.start_date.week AS iso_week".to_string()),
            "iso_year" => return_cols.push("e.start_date.year AS iso_year".to_string()),
            _ => {}
        }
    }

    let order_entries: Vec<OrderBy> = if plan.order_by.is_empty() {
        vec![OrderBy {
            field: "start_date".to_string(),
            dir: Direction::Asc,
        }]
    } else {
        plan.order_by.clone()
    };
    let mut order_cols: Vec<String> = Vec::new();
    for entry in &order_entries {
        match entry.field.as_str() {
            "start_date" | "end_date" | "name" => {
                order_cols.push(format!("e.{} {}", entry.field, entry.dir.cypher()));
            }
            _ => {}
        }
    }
    let order_str = if order_cols.is_empty() {
        String::new()
    } else {
        format!("ORDER BY {}\n", order_cols.join(", "))
    };

    let text = format!(
        "{prelude}{where_str}RETURN {}\n{order_str}",
        return_cols.join(", ")
    );
    CompiledQuery { text, params }
}

/// Half-open month window `[first-of-month, first-of-next-month)`, with
/// December rolling into January of the following year.
fn month_window(year: i32, month: u32) -> Option<(String, String)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some((
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    ))
}

fn same_day_pairs(term: &str) -> CompiledQuery {
    let text = concat!(
        "MATCH (:Term {name:$term})-[:HAS_EVENT]->(a:Event),\n",
        "      (:Term {name:$term})-[:HAS_EVENT]->(b:Event)\n",
        "WHERE a.start_date = b.start_date AND id(a) < id(b)\n",
        "RETURN a.name AS event1, toString(a.start_date) AS date, b.name AS event2\n",
        "ORDER BY date\n",
    )
    .to_string();
    CompiledQuery {
        text,
        params: BTreeMap::from([("term".to_string(), json!(term))]),
    }
}

fn overlap_pairs(term: &str) -> CompiledQuery {
    let text = concat!(
        "MATCH (:Term {name:$term})-[:HAS_EVENT]->(a:Event),\n",
        "      (:Term {name:$term})-[:HAS_EVENT]->(b:Event)\n",
        "WHERE a.start_date <= b.end_date AND b.start_date <= a.end_date AND id(a) < id(b)\n",
        "RETURN a.name AS event1, toString(a.start_date) AS a_start, toString(a.end_date) AS a_end,\n",
        "       b.name AS event2, toString(b.start_date) AS b_start, toString(b.end_date) AS b_end\n",
        "ORDER BY a_start, b_start\n",
    )
    .to_string();
    CompiledQuery {
        text,
        params: BTreeMap::from([("term".to_string(), json!(term))]),
    }
}
