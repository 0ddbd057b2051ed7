//! The plan IR: a closed, intent-tagged representation of one question.
//!
//! Plans are constructed fresh per question, normalized once by
//! [`crate::validate::validate_plan`], and immutable afterwards. Every field a
//! planner may leave out is an explicit `Option`/default here; nothing is
//! resolved downstream of validation.

use serde::{Deserialize, Serialize};

/// One event filter. The enum is closed: a raw filter whose `type` is not one
/// of these kinds does not deserialize and never reaches the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Events whose name equals the anchor event's name.
    AnchorExact { anchor_event: String },
    /// Events starting strictly after the anchor event's start date.
    AfterAnchor { anchor_event: String },
    /// Events starting strictly before the anchor event's start date.
    BeforeAnchor { anchor_event: String },
    /// Events starting on the given weekday ("Monday".."Sunday").
    WeekdayIn { weekday: String },
    /// Events starting within the given calendar month.
    MonthEq { year: i32, month: u32 },
    /// Events starting within the closed date interval `[start, end]`
    /// (ISO-8601 date strings).
    DateWindow { start: String, end: String },
    /// Pairwise shape: distinct event pairs sharing a start date.
    SameDayPairs,
    /// Pairwise shape: distinct event pairs with intersecting date intervals.
    OverlapPairs,
}

impl Filter {
    /// The wire name of this filter kind (matches the `type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Filter::AnchorExact { .. } => "anchor_exact",
            Filter::AfterAnchor { .. } => "after_anchor",
            Filter::BeforeAnchor { .. } => "before_anchor",
            Filter::WeekdayIn { .. } => "weekday_in",
            Filter::MonthEq { .. } => "month_eq",
            Filter::DateWindow { .. } => "date_window",
            Filter::SameDayPairs => "same_day_pairs",
            Filter::OverlapPairs => "overlap_pairs",
        }
    }

    /// True for the three anchor-relative kinds.
    pub fn is_anchor(&self) -> bool {
        matches!(
            self,
            Filter::AnchorExact { .. } | Filter::AfterAnchor { .. } | Filter::BeforeAnchor { .. }
        )
    }

    /// True for the kinds that force the pairwise output shape.
    pub fn is_pairwise(&self) -> bool {
        matches!(self, Filter::SameDayPairs | Filter::OverlapPairs)
    }

    pub fn anchor_event(&self) -> Option<&str> {
        match self {
            Filter::AnchorExact { anchor_event }
            | Filter::AfterAnchor { anchor_event }
            | Filter::BeforeAnchor { anchor_event } => Some(anchor_event),
            _ => None,
        }
    }

    pub(crate) fn anchor_event_mut(&mut self) -> Option<&mut String> {
        match self {
            Filter::AnchorExact { anchor_event }
            | Filter::AfterAnchor { anchor_event }
            | Filter::BeforeAnchor { anchor_event } => Some(anchor_event),
            _ => None,
        }
    }
}

/// Sort direction for an order-by entry. Defaults to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn cypher(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub dir: Direction,
}

/// A normalized query plan. Invariants (established by the validator):
/// `term` is non-empty; every filter kind, group key, and order field is
/// allow-listed; `select` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub term: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Carried through validation for callers; not rendered into the query
    /// text (see DESIGN.md).
    #[serde(default)]
    pub limit: Option<u64>,
}

/// The two plan intents: run a query, or ask the user for missing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Plan {
    Query(QueryPlan),
    AskClarification {
        #[serde(default)]
        missing: Vec<String>,
    },
}

impl Plan {
    /// The clarification plan emitted whenever a query plan lacks a term.
    pub fn needs_term() -> Self {
        Plan::AskClarification {
            missing: vec!["term".to_string()],
        }
    }

    pub fn as_query(&self) -> Option<&QueryPlan> {
        match self {
            Plan::Query(q) => Some(q),
            Plan::AskClarification { .. } => None,
        }
    }
}
