//! Multi-document YAML manifests of resources.

use anyhow::{Context, Result};
use keel_core::Resource;
use keel_store::{Registry, State};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub metadata: ManifestMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ManifestMeta {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "type")]
    pub typ: Option<String>,
    pub id: String,
}

pub fn parse(text: &str) -> Result<Vec<Manifest>> {
    let mut out = Vec::new();
    for (i, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(doc).with_context(|| format!("parsing document #{}", i))?;
        if value.is_null() { continue; }
        let m: Manifest = serde_yaml::from_value(value).with_context(|| format!("decoding document #{}", i))?;
        out.push(m);
    }
    Ok(out)
}

/// Decode a manifest into a fresh resource.
///
/// `kind` applies when the manifest names no type, `namespace` when it names no namespace;
/// without either the kind's default namespace is used.
pub fn decode(reg: &Registry, m: Manifest, kind: &str, namespace: Option<&str>) -> Result<Box<dyn Resource>> {
    let name = m.metadata.typ.as_deref().unwrap_or(kind);
    let entry = reg.resolve(name)?;
    let ns = m.metadata.namespace.as_deref().or(namespace);
    let res = entry.decode(ns, m.metadata.id, m.spec)?;
    debug!(key = %res.metadata().key(), "decoded manifest");
    Ok(res)
}

/// Commit every manifest into `state`, returning how many were created.
pub fn load(state: &State, text: &str, kind: &str, namespace: Option<&str>) -> Result<usize> {
    let mut n = 0;
    for m in parse(text)? {
        let res = decode(state.registry(), m, kind, namespace)?;
        let key = res.metadata().key();
        state.create(res).with_context(|| format!("creating {}", key))?;
        n += 1;
    }
    Ok(n)
}
