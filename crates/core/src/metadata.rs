//! Resource identity and metadata.
//!
//! A resource is identified by `(namespace, type, id)`; `version` tracks committed
//! mutations. Identity fields have no setters once constructed.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Namespace = String;
pub type ResourceType = String;
pub type Id = String;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid resource version: {0:?}")]
pub struct ParseVersionError(pub String);

/// Resource version. Undefined until the resource is first committed to a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version(Option<u64>);

impl Version {
    pub const UNDEFINED: Version = Version(None);

    pub fn new(v: u64) -> Self { Self(Some(v)) }

    pub fn value(&self) -> Option<u64> { self.0 }

    pub fn is_undefined(&self) -> bool { self.0.is_none() }

    /// Version following this one; undefined advances to 1.
    pub fn next(&self) -> Self {
        Self(Some(self.0.map_or(1, |v| v.saturating_add(1))))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("undefined"),
        }
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "undefined" => Ok(Version::UNDEFINED),
            _ => s.parse::<u64>().map(Version::new).map_err(|_| ParseVersionError(s.to_string())),
        }
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self { v.to_string() }
}

impl TryFrom<String> for Version {
    type Error = ParseVersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Running,
    TearingDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Running => f.write_str("running"),
            Phase::TearingDown => f.write_str("tearingDown"),
        }
    }
}

/// `(namespace, type, id)`: identity without the version. Used as a store index key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: Namespace,
    #[serde(rename = "type")]
    pub typ: ResourceType,
    pub id: Id,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}/{})", self.typ, self.namespace, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    namespace: Namespace,
    #[serde(rename = "type")]
    typ: ResourceType,
    id: Id,
    version: Version,
    #[serde(default)]
    phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    finalizers: SmallVec<[String; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
}

/// Timestamps are bookkeeping only and take no part in comparison.
impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace
            && self.typ == other.typ
            && self.id == other.id
            && self.version == other.version
            && self.phase == other.phase
            && self.owner == other.owner
            && self.labels == other.labels
            && self.finalizers == other.finalizers
    }
}

impl Eq for Metadata {}

impl Metadata {
    pub fn new(
        namespace: impl Into<Namespace>,
        typ: impl Into<ResourceType>,
        id: impl Into<Id>,
        version: Version,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            typ: typ.into(),
            id: id.into(),
            version,
            phase: Phase::Running,
            owner: None,
            labels: BTreeMap::new(),
            finalizers: SmallVec::new(),
            created: None,
            updated: None,
        }
    }

    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn typ(&self) -> &str { &self.typ }
    pub fn id(&self) -> &str { &self.id }
    pub fn version(&self) -> Version { self.version }
    pub fn phase(&self) -> Phase { self.phase }
    pub fn owner(&self) -> Option<&str> { self.owner.as_deref() }
    pub fn labels(&self) -> &BTreeMap<String, String> { &self.labels }
    pub fn finalizers(&self) -> &[String] { &self.finalizers }
    pub fn created(&self) -> Option<DateTime<Utc>> { self.created }
    pub fn updated(&self) -> Option<DateTime<Utc>> { self.updated }

    pub fn key(&self) -> ResourceKey {
        ResourceKey { namespace: self.namespace.clone(), typ: self.typ.clone(), id: self.id.clone() }
    }

    pub fn set_owner(&mut self, owner: Option<String>) { self.owner = owner; }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn remove_label(&mut self, key: &str) -> Option<String> { self.labels.remove(key) }

    /// Returns false if the finalizer was already present.
    pub fn add_finalizer(&mut self, fin: impl Into<String>) -> bool {
        let fin = fin.into();
        if self.finalizers.contains(&fin) { return false; }
        self.finalizers.push(fin);
        true
    }

    /// Returns false if the finalizer was not present.
    pub fn remove_finalizer(&mut self, fin: &str) -> bool {
        match self.finalizers.iter().position(|f| f == fin) {
            Some(idx) => { self.finalizers.remove(idx); true }
            None => false,
        }
    }

    // Store-owned mutation path: version, phase and timestamps are advanced on commit.

    pub fn set_phase(&mut self, phase: Phase) { self.phase = phase; }

    pub fn set_version(&mut self, version: Version) { self.version = version; }

    /// Advance the version by one and stamp the update time.
    pub fn bump_version(&mut self, now: DateTime<Utc>) {
        self.version = self.version.next();
        if self.created.is_none() { self.created = Some(now); }
        self.updated = Some(now);
    }
}
