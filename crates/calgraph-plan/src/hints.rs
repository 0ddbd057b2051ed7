//! Deterministic question recognizers and the rule-based planner.
//!
//! This is intentionally **not** an LLM parser: a small set of substring and
//! regex rules that (a) bias an external planner with hints and (b) back the
//! default planner when no LLM is configured. The check order in
//! [`classify_intent`] is a hard contract; callers depend on it verbatim.

use regex::Regex;
use serde::Serialize;

use crate::plan::{Direction, Filter, OrderBy, Plan, QueryPlan};
use crate::schema::SchemaRegistry;
use crate::validate::DEFAULT_SELECT;

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Lightweight signals pulled from the question text. Rules are applied
/// independently; any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hints {
    pub term: Option<String>,
    pub weekday: Option<String>,
    pub anchor: Option<String>,
    pub month_year: Option<(i32, u32)>,
}

pub fn extract_hints(
    question: &str,
    registry: &SchemaRegistry,
    fallback_year: Option<i32>,
) -> Hints {
    Hints {
        term: extract_term(question),
        weekday: extract_weekday(question).map(|s| s.to_string()),
        anchor: extract_anchor(question, registry),
        month_year: extract_month_year(question, fallback_year),
    }
}

/// Match "Fall 2025", "spring 2026", etc.; title-cased season + 4-digit year.
pub fn extract_term(question: &str) -> Option<String> {
    let re = Regex::new(r"(?i)\b(Fall|Spring|Summer)\s+(\d{4})\b").unwrap();
    let caps = re.captures(question)?;
    let season = caps.get(1)?.as_str();
    let year = caps.get(2)?.as_str();
    let mut chars = season.chars();
    let first = chars.next()?;
    let season = format!(
        "{}{}",
        first.to_uppercase(),
        chars.as_str().to_lowercase()
    );
    Some(format!("{season} {year}"))
}

/// First weekday name contained in the question, in Monday..Sunday order.
/// Plural forms match because the singular is a substring of them.
pub fn extract_weekday(question: &str) -> Option<&'static str> {
    let ql = question.to_lowercase();
    WEEKDAYS
        .iter()
        .find(|wd| ql.contains(&wd.to_lowercase()))
        .copied()
}

/// Anchor phrase: a quoted substring wins, normalized through the synonym
/// map; otherwise the first synonym phrase found in the lowercased question.
pub fn extract_anchor(question: &str, registry: &SchemaRegistry) -> Option<String> {
    let quoted = Regex::new(r#"'([^']+)'|"([^"]+)""#).unwrap();
    if let Some(caps) = quoted.captures(question) {
        let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
        return Some(registry.canonical_anchor(raw));
    }
    registry
        .scan_anchor(&question.to_lowercase())
        .map(|s| s.to_string())
}

/// First month name in the lowercased text, with the year taken from the
/// first `20xx` token or the caller-supplied fallback. `None` without both.
pub fn extract_month_year(question: &str, fallback_year: Option<i32>) -> Option<(i32, u32)> {
    let ql = question.to_lowercase();
    let (_, month) = MONTHS.iter().find(|(name, _)| ql.contains(name))?;
    let year_re = Regex::new(r"\b(20\d{2})\b").unwrap();
    let year = year_re
        .captures(&ql)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .or(fallback_year)?;
    Some((year, *month))
}

/// The eight query shapes the deterministic classifier can produce. The ninth
/// planner outcome, asking for a missing term, is the
/// [`Plan::AskClarification`] branch of [`rule_plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleIntent {
    Overlaps,
    SameDay,
    AfterAnchor,
    BeforeAnchor,
    ClassesStart,
    Weekday,
    Month,
    AllEvents,
}

/// Ordered, guarded intent checks. The precedence is a hard contract:
/// overlap, same-day, after+anchor, before+anchor, classes-start, weekday,
/// month, then all-events.
pub fn classify_intent(
    question: &str,
    registry: &SchemaRegistry,
    fallback_year: Option<i32>,
) -> RuleIntent {
    let ql = question.to_lowercase();
    let anchor = extract_anchor(question, registry);

    if ql.contains("overlap") {
        return RuleIntent::Overlaps;
    }
    if ql.contains("same day") || ql.contains("same-day") {
        return RuleIntent::SameDay;
    }
    if ql.contains("after") && anchor.is_some() {
        return RuleIntent::AfterAnchor;
    }
    if ql.contains("before") && anchor.is_some() {
        return RuleIntent::BeforeAnchor;
    }
    if ql.contains("start") && ql.contains("class") {
        return RuleIntent::ClassesStart;
    }
    if extract_weekday(question).is_some() {
        return RuleIntent::Weekday;
    }
    if extract_month_year(question, fallback_year).is_some() {
        return RuleIntent::Month;
    }
    RuleIntent::AllEvents
}

/// The deterministic planner: classify the question and emit the matching
/// plan, or a clarification when no term was recognized.
pub fn rule_plan(
    question: &str,
    registry: &SchemaRegistry,
    fallback_year: Option<i32>,
) -> Plan {
    let hints = extract_hints(question, registry, fallback_year);
    let Some(term) = hints.term else {
        return Plan::needs_term();
    };

    let intent = classify_intent(question, registry, fallback_year);
    let filters = match intent {
        RuleIntent::Overlaps => vec![Filter::OverlapPairs],
        RuleIntent::SameDay => vec![Filter::SameDayPairs],
        RuleIntent::AfterAnchor => match hints.anchor {
            Some(anchor_event) => vec![Filter::AfterAnchor { anchor_event }],
            None => vec![],
        },
        RuleIntent::BeforeAnchor => match hints.anchor {
            Some(anchor_event) => vec![Filter::BeforeAnchor { anchor_event }],
            None => vec![],
        },
        RuleIntent::ClassesStart => vec![Filter::AnchorExact {
            anchor_event: registry.canonical_anchor("classes begin"),
        }],
        RuleIntent::Weekday => match hints.weekday {
            Some(weekday) => vec![Filter::WeekdayIn { weekday }],
            None => vec![],
        },
        RuleIntent::Month => match hints.month_year {
            Some((year, month)) => vec![Filter::MonthEq { year, month }],
            None => vec![],
        },
        RuleIntent::AllEvents => vec![],
    };

    Plan::Query(QueryPlan {
        term,
        filters,
        group_by: vec![],
        select: DEFAULT_SELECT.iter().map(|s| s.to_string()).collect(),
        order_by: vec![OrderBy {
            field: "start_date".to_string(),
            dir: Direction::Asc,
        }],
        limit: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg() -> SchemaRegistry {
        SchemaRegistry::builtin()
    }

    #[test]
    fn term_is_title_cased() {
        assert_eq!(
            extract_term("what happens in fall 2025?"),
            Some("Fall 2025".to_string())
        );
        assert_eq!(
            extract_term("SPRING 2026 deadlines"),
            Some("Spring 2026".to_string())
        );
        assert_eq!(extract_term("next semester"), None);
    }

    #[test]
    fn weekday_first_match_wins_in_list_order() {
        assert_eq!(
            extract_weekday("friday or monday events?"),
            Some("Monday")
        );
        assert_eq!(extract_weekday("events on Tuesdays"), Some("Tuesday"));
        assert_eq!(extract_weekday("any events"), None);
    }

    #[test]
    fn quoted_anchor_beats_synonym_scan() {
        assert_eq!(
            extract_anchor("before 'Reading Day' but after classes begin", &reg()),
            Some("Reading Day".to_string())
        );
    }

    #[test]
    fn quoted_anchor_is_normalized() {
        assert_eq!(
            extract_anchor(r#"what comes after "classes start"?"#, &reg()),
            Some("Classes Begin".to_string())
        );
    }

    #[test]
    fn month_uses_fallback_year() {
        assert_eq!(
            extract_month_year("events in september", Some(2025)),
            Some((2025, 9))
        );
        assert_eq!(extract_month_year("events in september", None), None);
        assert_eq!(
            extract_month_year("december 2026 exams", None),
            Some((2026, 12))
        );
    }

    #[test]
    fn intent_precedence_is_fixed() {
        let r = reg();
        // overlap beats same-day beats anchor checks
        assert_eq!(
            classify_intent("overlapping same day after classes end", &r, None),
            RuleIntent::Overlaps
        );
        assert_eq!(
            classify_intent("same day as classes begin", &r, None),
            RuleIntent::SameDay
        );
        assert_eq!(
            classify_intent("events after classes end", &r, None),
            RuleIntent::AfterAnchor
        );
        assert_eq!(
            classify_intent("deadlines before classes begin", &r, None),
            RuleIntent::BeforeAnchor
        );
        // "after" without an anchor is not anchor-relative
        assert_eq!(
            classify_intent("what comes after the break", &r, None),
            RuleIntent::AllEvents
        );
        assert_eq!(
            classify_intent("when do classes start", &r, None),
            RuleIntent::ClassesStart
        );
        assert_eq!(
            classify_intent("monday events", &r, None),
            RuleIntent::Weekday
        );
        assert_eq!(
            classify_intent("events in october 2025", &r, None),
            RuleIntent::Month
        );
        assert_eq!(
            classify_intent("list everything", &r, None),
            RuleIntent::AllEvents
        );
    }

    #[test]
    fn rule_plan_without_term_asks_for_it() {
        assert_eq!(rule_plan("monday events", &reg(), None), Plan::needs_term());
    }

    #[test]
    fn rule_plan_builds_weekday_query() {
        let plan = rule_plan("monday events in Fall 2025", &reg(), None);
        let q = plan.as_query().expect("query plan");
        assert_eq!(q.term, "Fall 2025");
        assert_eq!(
            q.filters,
            vec![Filter::WeekdayIn {
                weekday: "Monday".to_string()
            }]
        );
        assert_eq!(q.order_by[0].field, "start_date");
    }

    #[test]
    fn rule_plan_classes_start_uses_canonical_anchor() {
        let plan = rule_plan("when do classes start in Fall 2025?", &reg(), None);
        let q = plan.as_query().expect("query plan");
        assert_eq!(
            q.filters,
            vec![Filter::AnchorExact {
                anchor_event: "Classes Begin".to_string()
            }]
        );
    }
}
