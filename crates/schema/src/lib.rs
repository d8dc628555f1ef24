//! Keel schema: print-column paths and tabular rendering of resources.
//!
//! Paths use a small JSONPath subset, `{.metadata.name}` or `.spec.dnsNames[0]`:
//! dot-separated keys, each optionally followed by one `[index]`. Paths are evaluated
//! against a resource's rendered spec; anything that does not resolve to a scalar
//! renders as an empty cell.

#![forbid(unsafe_code)]

use std::fmt;

use keel_core::{PrintColumn, Resource, ResourceDefinitionSpec};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("unsupported path {0:?}: filters and wildcards are not supported")]
    Unsupported(String),
    #[error("invalid segment {seg:?} in path {path:?}")]
    InvalidSegment { path: String, seg: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub key: String,
    pub index: Option<usize>,
}

/// Parsed column path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPath {
    segments: SmallVec<[Segment; 4]>,
}

impl ColumnPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .trim();
        if inner.contains('?') || inner.contains('*') || inner.contains("..") {
            return Err(PathError::Unsupported(raw.to_string()));
        }
        let s = inner.strip_prefix('.').unwrap_or(inner);
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = SmallVec::new();
        for seg in s.split('.') {
            segments.push(parse_segment(seg).ok_or_else(|| PathError::InvalidSegment {
                path: raw.to_string(),
                seg: seg.to_string(),
            })?);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    pub fn lookup<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        use serde_json::Value;
        let mut cur = root;
        for seg in self.segments.iter() {
            cur = match cur {
                Value::Object(map) => map.get(&seg.key)?,
                _ => return None,
            };
            if let Some(i) = seg.index {
                cur = match cur {
                    Value::Array(arr) => arr.get(i)?,
                    _ => return None,
                };
            }
        }
        Some(cur)
    }

    /// Scalar at this path as a string; empty when absent or not a scalar.
    pub fn render(&self, root: &serde_json::Value) -> String {
        match self.lookup(root) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for seg in self.segments.iter() {
            write!(f, ".{}", seg.key)?;
            if let Some(i) = seg.index { write!(f, "[{}]", i)?; }
        }
        f.write_str("}")
    }
}

// Key chars are alnum, underscore or hyphen; an optional single [digits] must end the segment.
fn parse_segment(seg: &str) -> Option<Segment> {
    let (key, index) = match seg.find('[') {
        Some(open) => {
            let idx = seg[open + 1..].strip_suffix(']')?;
            if idx.is_empty() || !idx.chars().all(|c| c.is_ascii_digit()) { return None; }
            (&seg[..open], Some(idx.parse().ok()?))
        }
        None => (seg, None),
    };
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return None;
    }
    Some(Segment { key: key.to_string(), index })
}

/// Check every print column path of a definition.
pub fn validate_columns(def: &ResourceDefinitionSpec) -> Result<(), PathError> {
    for col in def.print_columns.iter() {
        ColumnPath::parse(&col.json_path)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub label: String,
    pub path: Option<ColumnPath>,
}

/// Renders resources of one kind: identity columns followed by the kind's print columns.
#[derive(Debug, Clone)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
}

pub const IDENTITY_COLUMNS: [&str; 4] = ["NAMESPACE", "TYPE", "ID", "VERSION"];

impl TableSpec {
    /// Unparseable column paths are kept as always-empty columns.
    pub fn for_definition(def: &ResourceDefinitionSpec) -> Self {
        let columns = def.print_columns.iter().map(column_spec).collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] { &self.columns }

    pub fn headers(&self) -> Vec<String> {
        IDENTITY_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(self.columns.iter().map(|c| c.label.to_uppercase()))
            .collect()
    }

    pub fn row(&self, res: &dyn Resource) -> Vec<String> {
        let md = res.metadata();
        let spec = res.spec_value();
        let mut out = vec![md.namespace().to_string(), md.typ().to_string(), md.id().to_string(), md.version().to_string()];
        out.extend(self.columns.iter().map(|c| c.path.as_ref().map(|p| p.render(&spec)).unwrap_or_default()));
        out
    }
}

fn column_spec(col: &PrintColumn) -> ColumnSpec {
    let path = match ColumnPath::parse(&col.json_path) {
        Ok(p) => Some(p),
        Err(e) => {
            debug!(column = %col.name, error = %e, "print column path does not parse; rendering empty");
            None
        }
    };
    ColumnSpec { label: col.name.clone(), path }
}

/// Header plus rows, ready for printing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn build<'a>(spec: &TableSpec, items: impl IntoIterator<Item = &'a dyn Resource>) -> Self {
        Self { headers: spec.headers(), rows: items.into_iter().map(|r| spec.row(r)).collect() }
    }

    /// Left-aligned columns separated by three spaces.
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in self.rows.iter() {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) { *w = (*w).max(cell.chars().count()); }
            }
        }
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let cells: Vec<String> = line
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:<width$}", c, width = widths.get(i).copied().unwrap_or(0)))
                .collect();
            out.push_str(cells.join("   ").trim_end());
            out.push('\n');
        }
        out
    }
}
