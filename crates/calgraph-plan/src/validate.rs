//! Plan validation and normalization.
//!
//! Input is a raw plan of unknown trustworthiness (typically straight from an
//! LLM planner). The contract is asymmetric on purpose:
//!
//! - a missing `intent` is the *only* hard failure;
//! - a missing term coerces the plan to a clarification, whatever else it
//!   carries;
//! - everything else malformed (unknown filter kinds, wrong types, disallowed
//!   group/order fields) is dropped or defaulted, never escalated. Unknown
//!   filters are counted so callers can observe what was discarded.
//!
//! The output is always well-formed: a query plan containing only allow-listed
//! contents, or a clarification plan. Re-validating a normalized plan yields
//! the same plan.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::plan::{Direction, Filter, OrderBy, Plan, QueryPlan};
use crate::schema::SchemaRegistry;

/// Columns projected when a plan does not ask for any.
pub const DEFAULT_SELECT: [&str; 4] = ["name", "start_date", "end_date", "source"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("planner did not return an intent")]
    MissingIntent,
}

/// A validated plan plus observability counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub plan: Plan,
    /// Raw filters discarded because their kind was unknown, disallowed, or
    /// their fields did not parse.
    pub dropped_filters: usize,
}

pub fn validate_plan(registry: &SchemaRegistry, raw: &Value) -> Result<Normalized, PlanError> {
    let Some(intent) = raw.get("intent").and_then(Value::as_str) else {
        return Err(PlanError::MissingIntent);
    };

    if intent == "ask_clarification" {
        let missing = string_list(raw.get("missing"));
        return Ok(Normalized {
            plan: Plan::AskClarification { missing },
            dropped_filters: 0,
        });
    }

    // Any other intent string takes the query path.
    let term = raw
        .get("term")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if term.is_empty() {
        return Ok(Normalized {
            plan: Plan::needs_term(),
            dropped_filters: 0,
        });
    }

    let mut dropped = 0usize;
    let mut filters = Vec::new();
    for raw_filter in raw
        .get("filters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        match parse_filter(registry, raw_filter) {
            Some(f) => filters.push(f),
            None => dropped += 1,
        }
    }

    let group_by: Vec<String> = string_list(raw.get("group_by"))
        .into_iter()
        .filter(|g| registry.group_key_allowed(g))
        .collect();

    let mut order_by = Vec::new();
    for entry in raw
        .get("order_by")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(field) = entry.get("field").and_then(Value::as_str) else {
            continue;
        };
        if !registry.order_field_allowed(field) {
            continue;
        }
        let dir = match entry
            .get("dir")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("desc") => Direction::Desc,
            _ => Direction::Asc,
        };
        order_by.push(OrderBy {
            field: field.to_string(),
            dir,
        });
    }

    let mut select = string_list(raw.get("select"));
    if select.is_empty() {
        select = DEFAULT_SELECT.iter().map(|s| s.to_string()).collect();
    }

    let limit = raw.get("limit").and_then(Value::as_u64);

    if dropped > 0 {
        debug!(dropped, term, "dropped unrecognized plan filters");
    }

    Ok(Normalized {
        plan: Plan::Query(QueryPlan {
            term: term.to_string(),
            filters,
            group_by,
            select,
            order_by,
            limit,
        }),
        dropped_filters: dropped,
    })
}

/// Parse one raw filter: kind must be allow-listed and the fields must
/// deserialize; the anchor name, if any, is canonicalized. `None` means drop.
fn parse_filter(registry: &SchemaRegistry, raw: &Value) -> Option<Filter> {
    let kind = raw.get("type").and_then(Value::as_str)?;
    if !registry.filter_allowed(kind) {
        return None;
    }
    let mut filter: Filter = serde_json::from_value(raw.clone()).ok()?;
    if let Filter::MonthEq { month, .. } = &filter {
        if !(1..=12).contains(month) {
            return None;
        }
    }
    if let Some(anchor) = filter.anchor_event_mut() {
        *anchor = registry.canonical_anchor(anchor);
    }
    Some(filter)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
