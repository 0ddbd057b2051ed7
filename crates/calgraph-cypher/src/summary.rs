//! Deterministic factual summaries of query results.
//!
//! The summary is the ground truth for the final answer: a downstream
//! rewriter may rephrase it but must not contradict it, so every line carries
//! the factual fields (names, dates, weekdays) needed to check the rewrite.

use serde_json::Value;

use calgraph_plan::{Filter, QueryPlan};

use crate::compile::Row;

/// What kind of answer the rows represent. Derived from a normalized plan
/// with the same precedence the compiler uses, so summary wording always
/// matches the executed query shape.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerIntent {
    SameDayPairs,
    OverlapPairs,
    AnchorExact { anchor: String },
    AfterAnchor { anchor: String },
    BeforeAnchor { anchor: String },
    Weekday { weekday: String },
    Month { year: i32, month: u32 },
    Window { start: String, end: String },
    Listing,
}

impl AnswerIntent {
    pub fn from_plan(plan: &QueryPlan) -> Self {
        if plan.filters.iter().any(|f| matches!(f, Filter::SameDayPairs)) {
            return AnswerIntent::SameDayPairs;
        }
        if plan.filters.iter().any(|f| matches!(f, Filter::OverlapPairs)) {
            return AnswerIntent::OverlapPairs;
        }
        for f in &plan.filters {
            match f {
                Filter::AnchorExact { anchor_event } => {
                    return AnswerIntent::AnchorExact {
                        anchor: anchor_event.clone(),
                    }
                }
                Filter::AfterAnchor { anchor_event } => {
                    return AnswerIntent::AfterAnchor {
                        anchor: anchor_event.clone(),
                    }
                }
                Filter::BeforeAnchor { anchor_event } => {
                    return AnswerIntent::BeforeAnchor {
                        anchor: anchor_event.clone(),
                    }
                }
                _ => {}
            }
        }
        for f in &plan.filters {
            match f {
                Filter::WeekdayIn { weekday } => {
                    return AnswerIntent::Weekday {
                        weekday: weekday.clone(),
                    }
                }
                Filter::MonthEq { year, month } => {
                    return AnswerIntent::Month {
                        year: *year,
                        month: *month,
                    }
                }
                Filter::DateWindow { start, end } => {
                    return AnswerIntent::Window {
                        start: start.clone(),
                        end: end.clone(),
                    }
                }
                _ => {}
            }
        }
        AnswerIntent::Listing
    }

    /// Short human description of the query, used in headers and in the
    /// zero-row sentence.
    pub fn describe(&self, term: &str) -> String {
        match self {
            AnswerIntent::SameDayPairs => format!("same-day event pairs in {term}"),
            AnswerIntent::OverlapPairs => format!("overlapping events in {term}"),
            AnswerIntent::AnchorExact { anchor } => format!("'{anchor}' events in {term}"),
            AnswerIntent::AfterAnchor { anchor } => {
                format!("events in {term} after '{anchor}'")
            }
            AnswerIntent::BeforeAnchor { anchor } => {
                format!("events in {term} before '{anchor}'")
            }
            AnswerIntent::Weekday { weekday } => format!("{weekday} events in {term}"),
            AnswerIntent::Month { year, month } => {
                format!("events in {term} during {year}-{month:02}")
            }
            AnswerIntent::Window { start, end } => {
                format!("events in {term} between {start} and {end}")
            }
            AnswerIntent::Listing => format!("all events in {term}"),
        }
    }
}

/// Render rows into the factual narrative for one intent. Pure; zero rows
/// produce a sentence beginning with the fixed "No matching events" phrase.
pub fn summarize(question: &str, intent: &AnswerIntent, term: &str, rows: &[Row]) -> String {
    let desc = intent.describe(term);
    if rows.is_empty() {
        return format!("No matching events found for \"{question}\" ({desc}).");
    }

    let n = rows.len();
    let mut lines: Vec<String> = Vec::new();
    match intent {
        AnswerIntent::AnchorExact { anchor } => {
            lines.push(format!("There are {n} '{anchor}' event row(s) for {term}:"));
            for r in rows {
                lines.push(format!(
                    "- Event '{}' on {}{}, end date {}.",
                    field(r, "name"),
                    field(r, "start_date"),
                    weekday_note(r),
                    field(r, "end_date"),
                ));
            }
        }
        AnswerIntent::AfterAnchor { anchor } | AnswerIntent::BeforeAnchor { anchor } => {
            let direction = if matches!(intent, AnswerIntent::AfterAnchor { .. }) {
                "after"
            } else {
                "before"
            };
            lines.push(format!(
                "There are {n} event row(s) in {term} that occur {direction} the anchor event '{anchor}':"
            ));
            for r in rows {
                lines.push(format!(
                    "- '{}' from {} to {}{}.",
                    field(r, "name"),
                    field(r, "start_date"),
                    field(r, "end_date"),
                    weekday_note(r),
                ));
            }
        }
        AnswerIntent::Weekday { weekday } => {
            lines.push(format!(
                "There are {n} event row(s) in {term} that start on {weekday}:"
            ));
            for r in rows {
                lines.push(format!(
                    "- '{}' on {} (ends {}).",
                    field(r, "name"),
                    field(r, "start_date"),
                    field(r, "end_date"),
                ));
            }
        }
        AnswerIntent::Month { year, month } => {
            lines.push(format!(
                "There are {n} event row(s) in {term} during {year}-{month:02}:"
            ));
            for r in rows {
                lines.push(format!(
                    "- '{}' on {} (ends {}){}.",
                    field(r, "name"),
                    field(r, "start_date"),
                    field(r, "end_date"),
                    weekday_note(r),
                ));
            }
        }
        AnswerIntent::Window { start, end } => {
            lines.push(format!(
                "There are {n} event row(s) in {term} between {start} and {end}:"
            ));
            for r in rows {
                lines.push(format!(
                    "- '{}' on {} (ends {}).",
                    field(r, "name"),
                    field(r, "start_date"),
                    field(r, "end_date"),
                ));
            }
        }
        AnswerIntent::SameDayPairs => {
            lines.push(format!("There are {n} same-day event pair row(s) in {term}:"));
            for r in rows {
                lines.push(format!(
                    "- On {}, '{}' and '{}' occur on the same day.",
                    field(r, "date"),
                    field(r, "event1"),
                    field(r, "event2"),
                ));
            }
        }
        AnswerIntent::OverlapPairs => {
            lines.push(format!(
                "There are {n} overlapping event pair row(s) in {term}:"
            ));
            for r in rows {
                lines.push(format!(
                    "- '{}' ({} to {}) overlaps with '{}' ({} to {}).",
                    field(r, "event1"),
                    field(r, "a_start"),
                    field(r, "a_end"),
                    field(r, "event2"),
                    field(r, "b_start"),
                    field(r, "b_end"),
                ));
            }
        }
        AnswerIntent::Listing => {
            lines.push(format!("There are {n} event row(s) for {term} in total:"));
            for r in rows {
                lines.push(format!(
                    "- '{}' from {} to {}{}.",
                    field(r, "name"),
                    field(r, "start_date"),
                    field(r, "end_date"),
                    weekday_note(r),
                ));
            }
        }
    }
    lines.join("\n")
}

/// Scalar cell rendered for the narrative; missing and null cells show as "?".
fn field(row: &Row, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "?".to_string(),
        Some(other) => other.to_string(),
    }
}

fn weekday_note(row: &Row) -> String {
    match row.get("weekday").and_then(Value::as_str) {
        Some(w) => format!(" (weekday {w})"),
        None => String::new(),
    }
}
