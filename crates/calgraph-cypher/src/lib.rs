//! Plan → Cypher compilation and row summarization.
//!
//! The compiler is a total function over normalized plans: validation (in
//! `calgraph-plan`) guarantees only allow-listed vocabulary arrives here, so
//! compilation never fails and every value reaches the store as a named
//! parameter, never spliced into query text.
//!
//! The summarizer is the other end of the same safety story: it renders the
//! executor's rows into a deterministic factual narrative that any downstream
//! rewriting (an LLM) is constrained to preserve.

pub mod compile;
pub mod summary;

pub use compile::{compile, CompiledQuery, Row};
pub use summary::{summarize, AnswerIntent};
