//! Allow-listed query vocabulary and anchor synonyms.
//!
//! The registry is built once at process startup and is read-only afterwards.
//! The validator consults it to decide which plan contents may reach the
//! compiler; the hint extractor uses the synonym map to canonicalize anchor
//! phrases ("classes start" ↦ "Classes Begin"). Malformed config is a startup
//! failure, never a per-request one.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema config lists no allowed filter kinds")]
    EmptyFilterKinds,
}

/// Shape of `schema.json`: the three allow-lists.
#[derive(Debug, Deserialize)]
struct SchemaConfig {
    allow_filters: Vec<String>,
    allow_group_by: Vec<String>,
    allow_order_by: Vec<String>,
}

/// Shape of `synonyms.json`: lowercase anchor phrase → canonical Event name.
#[derive(Debug, Deserialize)]
struct SynonymConfig {
    anchors: BTreeMap<String, String>,
}

/// Immutable allow-lists plus the anchor synonym map.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    filter_kinds: BTreeSet<String>,
    group_keys: BTreeSet<String>,
    order_fields: BTreeSet<String>,
    /// Lowercase phrase → canonical name, in deterministic (sorted) scan order.
    anchor_synonyms: Vec<(String, String)>,
}

impl SchemaRegistry {
    /// Registry matching the production calendar deployment. Used when no
    /// config files are supplied.
    pub fn builtin() -> Self {
        let filters = [
            "anchor_exact",
            "after_anchor",
            "before_anchor",
            "weekday_in",
            "month_eq",
            "date_window",
            "same_day_pairs",
            "overlap_pairs",
        ];
        let synonyms = [
            ("classes begin", "Classes Begin"),
            ("classes start", "Classes Begin"),
            ("start of classes", "Classes Begin"),
            ("first day of classes", "Classes Begin"),
            ("classes end", "Classes End"),
            ("class end", "Classes End"),
            ("end of classes", "Classes End"),
            ("last day of classes", "Classes End"),
        ];
        Self {
            filter_kinds: filters.iter().map(|s| s.to_string()).collect(),
            group_keys: ["iso_year", "iso_week"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            order_fields: ["start_date", "end_date", "name"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            anchor_synonyms: synonyms
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Load the registry from `schema.json` + `synonyms.json`.
    ///
    /// Any read or parse failure is returned as a [`RegistryError`]; callers
    /// treat this as fatal at startup.
    pub fn from_config_files(schema: &Path, synonyms: &Path) -> Result<Self, RegistryError> {
        let schema_text = read(schema)?;
        let schema_cfg: SchemaConfig = parse(schema, &schema_text)?;
        if schema_cfg.allow_filters.is_empty() {
            return Err(RegistryError::EmptyFilterKinds);
        }

        let syn_text = read(synonyms)?;
        let syn_cfg: SynonymConfig = parse(synonyms, &syn_text)?;

        Ok(Self {
            filter_kinds: schema_cfg.allow_filters.into_iter().collect(),
            group_keys: schema_cfg.allow_group_by.into_iter().collect(),
            order_fields: schema_cfg.allow_order_by.into_iter().collect(),
            anchor_synonyms: syn_cfg
                .anchors
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        })
    }

    pub fn filter_allowed(&self, kind: &str) -> bool {
        self.filter_kinds.contains(kind)
    }

    pub fn group_key_allowed(&self, key: &str) -> bool {
        self.group_keys.contains(key)
    }

    pub fn order_field_allowed(&self, field: &str) -> bool {
        self.order_fields.contains(field)
    }

    /// Canonicalize an anchor phrase: case-insensitive synonym lookup, falling
    /// back to the trimmed input when no synonym matches.
    pub fn canonical_anchor(&self, phrase: &str) -> String {
        let trimmed = phrase.trim();
        let key = trimmed.to_lowercase();
        self.anchor_synonyms
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, canon)| canon.clone())
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// First synonym phrase found as a substring of `text_lower`, returned as
    /// the canonical anchor name. Scan order is deterministic; questions are
    /// expected to contain at most one anchor phrase.
    pub fn scan_anchor(&self, text_lower: &str) -> Option<&str> {
        self.anchor_synonyms
            .iter()
            .find(|(k, _)| text_lower.contains(k.as_str()))
            .map(|(_, canon)| canon.as_str())
    }
}

fn read(path: &Path) -> Result<String, RegistryError> {
    std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, RegistryError> {
    serde_json::from_str(text).map_err(|source| RegistryError::Parse {
        path: path.display().to_string(),
        source,
    })
}
