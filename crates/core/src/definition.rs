//! Resource definitions: the self-description a kind exposes to generic tooling.
//!
//! A definition is plain data (type, aliases, default namespace, print columns),
//! so registries and renderers never need the kind's concrete spec type.

#![forbid(unsafe_code)]

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::metadata::{Namespace, ResourceType};

/// Column label plus the path projecting its value out of a rendered spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintColumn {
    pub name: String,
    #[serde(rename = "jsonPath")]
    pub json_path: String,
}

impl PrintColumn {
    pub fn new(name: impl Into<String>, json_path: impl Into<String>) -> Self {
        Self { name: name.into(), json_path: json_path.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinitionSpec {
    #[serde(rename = "type")]
    pub typ: ResourceType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_type: String,
    #[serde(default)]
    pub aliases: Vec<ResourceType>,
    pub default_namespace: Namespace,
    #[serde(default)]
    pub print_columns: Vec<PrintColumn>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid resource type {0:?}: expected Plural.domain.tld")]
    InvalidType(String),
    #[error("default namespace is empty for {0}")]
    EmptyNamespace(String),
    #[error("empty alias for {0}")]
    EmptyAlias(String),
    #[error("alias {0:?} repeats the canonical type")]
    AliasIsType(String),
    #[error("print column #{index} of {typ} has an empty name")]
    EmptyColumnName { typ: String, index: usize },
    #[error("print column {name:?} of {typ} has an empty path")]
    EmptyColumnPath { typ: String, name: String },
}

static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9-]*(\.[a-z0-9-]+)+$").unwrap());

impl ResourceDefinitionSpec {
    /// Structural checks. Column paths are checked by whoever evaluates them.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !TYPE_RE.is_match(&self.typ) {
            return Err(DefinitionError::InvalidType(self.typ.clone()));
        }
        if self.default_namespace.is_empty() {
            return Err(DefinitionError::EmptyNamespace(self.typ.clone()));
        }
        for alias in &self.aliases {
            if alias.is_empty() {
                return Err(DefinitionError::EmptyAlias(self.typ.clone()));
            }
            if alias == &self.typ {
                return Err(DefinitionError::AliasIsType(alias.clone()));
            }
        }
        for (index, col) in self.print_columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(DefinitionError::EmptyColumnName { typ: self.typ.clone(), index });
            }
            if col.json_path.trim().is_empty() {
                return Err(DefinitionError::EmptyColumnPath { typ: self.typ.clone(), name: col.name.clone() });
            }
        }
        Ok(())
    }

    /// Complete a validated definition with its display type and derived lookup aliases.
    ///
    /// For `ExtensionStatuses.runtime.talos.dev` this adds `extensionstatuses.runtime.talos.dev`,
    /// `extensionstatuses`, `extensionstatus` and `es`, after any explicit aliases.
    pub fn fill(&mut self) {
        let plural = self.typ.split('.').next().unwrap_or_default().to_string();
        let singular = singularize(&plural);
        let abbrev: String = plural.chars().filter(|c| c.is_ascii_uppercase()).collect::<String>().to_lowercase();

        if self.display_type.is_empty() {
            self.display_type = singular.clone();
        }

        let derived: SmallVec<[String; 4]> = SmallVec::from_buf([
            self.typ.to_lowercase(),
            plural.to_lowercase(),
            singular.to_lowercase(),
            abbrev,
        ]);
        for alias in derived {
            if alias.is_empty() || alias == self.typ || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(&alias)) {
                continue;
            }
            self.aliases.push(alias);
        }
    }

    /// The canonical type followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.typ.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

fn singularize(plural: &str) -> String {
    if let Some(stem) = plural.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "shes", "ches", "xes", "ses"] {
        if plural.ends_with(suffix) {
            return plural[..plural.len() - 2].to_string();
        }
    }
    match plural.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => plural.to_string(),
    }
}
