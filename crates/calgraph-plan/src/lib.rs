//! Calgraph plan layer: the typed intermediate representation between a
//! natural-language question about academic-calendar events and an executable
//! graph query.
//!
//! Why a typed IR?
//! - Planners (an LLM, or the deterministic rule planner in [`hints`]) are good
//!   at producing *structured* JSON, but their output is untrusted: unknown
//!   keys, unknown filter kinds, missing fields, wrong types.
//! - Validating that JSON against a closed, allow-listed IR lets the compiler
//!   downstream be a total function: nothing outside the vocabulary in
//!   [`schema::SchemaRegistry`] ever reaches query construction.
//!
//! The pipeline is: question → [`hints::extract_hints`] → planner → raw plan
//! JSON → [`validate::validate_plan`] → [`plan::Plan`] → compiler.

pub mod hints;
pub mod plan;
pub mod schema;
pub mod validate;

pub use hints::{classify_intent, extract_hints, rule_plan, Hints, RuleIntent};
pub use plan::{Direction, Filter, OrderBy, Plan, QueryPlan};
pub use schema::{RegistryError, SchemaRegistry};
pub use validate::{validate_plan, Normalized, PlanError, DEFAULT_SELECT};
