//! Kind registry: validates resource definitions and resolves types and aliases.

use std::any::TypeId;

use keel_core::{
    DefinitionError, Id, Metadata, Resource, ResourceDefinitionProvider, ResourceDefinitionSpec, ResourceSpec,
    ResourceType, TypedResource, Version,
};
use keel_schema::PathError;
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid definition: {0}")]
    Definition(#[from] DefinitionError),
    #[error("invalid print column: {0}")]
    Path(#[from] PathError),
    #[error("kind registered as {registered} describes itself as {described}")]
    TypeMismatch { registered: String, described: String },
    #[error("resource type {0} is already registered")]
    AlreadyRegistered(String),
    #[error("alias {alias:?} of {typ} is already used by {other}")]
    AliasConflict { alias: String, typ: String, other: String },
    #[error("unknown resource type {0:?}")]
    UnknownType(String),
    #[error("decoding {typ} spec: {source}")]
    Decode { typ: String, #[source] source: serde_json::Error },
}

type DecodeFn = fn(Metadata, serde_json::Value) -> Result<Box<dyn Resource>, serde_json::Error>;

fn decode_typed<T: ResourceSpec, RD: ResourceDefinitionProvider<T>>(
    md: Metadata,
    spec: serde_json::Value,
) -> Result<Box<dyn Resource>, serde_json::Error> {
    let spec: T = if spec.is_null() { T::default() } else { serde_json::from_value(spec)? };
    Ok(Box::new(TypedResource::<T, RD>::new(md, spec)))
}

/// A registered kind: its filled definition, its concrete resource type and a decoder for its spec.
pub struct KindEntry {
    definition: ResourceDefinitionSpec,
    payload: TypeId,
    decode: DecodeFn,
}

impl KindEntry {
    pub fn definition(&self) -> &ResourceDefinitionSpec { &self.definition }

    pub fn typ(&self) -> &str { &self.definition.typ }

    /// True if `res` is the `TypedResource` this kind was registered with.
    pub fn accepts(&self, res: &dyn Resource) -> bool { res.as_any().type_id() == self.payload }

    /// Build a fresh resource of this kind; a missing namespace means the kind's default one.
    pub fn decode(
        &self,
        namespace: Option<&str>,
        id: impl Into<Id>,
        spec: serde_json::Value,
    ) -> Result<Box<dyn Resource>, RegistryError> {
        let ns = namespace.unwrap_or(self.definition.default_namespace.as_str());
        let md = Metadata::new(ns, self.definition.typ.clone(), id, Version::UNDEFINED);
        (self.decode)(md, spec).map_err(|source| RegistryError::Decode { typ: self.definition.typ.clone(), source })
    }
}

impl std::fmt::Debug for KindEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindEntry").field("definition", &self.definition).finish()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    kinds: FxHashMap<ResourceType, KindEntry>,
    /// Lower-cased type or alias -> canonical type.
    names: FxHashMap<String, ResourceType>,
    order: Vec<ResourceType>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }

    /// Register a kind from its spec type and definition provider.
    pub fn register<T: ResourceSpec, RD: ResourceDefinitionProvider<T>>(&mut self) -> Result<(), RegistryError> {
        let sample = TypedResource::<T, RD>::with_id("", "", T::default());
        let def = sample.resource_definition();
        if def.typ != RD::TYPE {
            return Err(RegistryError::TypeMismatch { registered: RD::TYPE.to_string(), described: def.typ });
        }
        self.insert(def, TypeId::of::<TypedResource<T, RD>>(), decode_typed::<T, RD>)
    }

    fn insert(&mut self, mut def: ResourceDefinitionSpec, payload: TypeId, decode: DecodeFn) -> Result<(), RegistryError> {
        def.validate()?;
        keel_schema::validate_columns(&def)?;
        if self.kinds.contains_key(&def.typ) {
            return Err(RegistryError::AlreadyRegistered(def.typ));
        }

        let explicit = def.aliases.clone();
        def.fill();

        // Explicit names must be free; derived aliases that collide are dropped.
        let mut dropped: Vec<String> = Vec::new();
        for name in std::iter::once(&def.typ).chain(explicit.iter()) {
            if let Some(other) = self.names.get(&name.to_lowercase()) {
                return Err(RegistryError::AliasConflict { alias: name.clone(), typ: def.typ.clone(), other: other.clone() });
            }
        }
        def.aliases.retain(|alias| {
            if explicit.contains(alias) { return true; }
            let free = !self.names.contains_key(&alias.to_lowercase());
            if !free { dropped.push(alias.clone()); }
            free
        });
        if !dropped.is_empty() {
            debug!(typ = %def.typ, dropped = ?dropped, "derived aliases already taken");
        }

        for name in def.names() {
            self.names.insert(name.to_lowercase(), def.typ.clone());
        }
        info!(typ = %def.typ, aliases = ?def.aliases, default_namespace = %def.default_namespace, "registered resource kind");
        counter!("keel_registry_kinds_total", 1);
        self.order.push(def.typ.clone());
        self.kinds.insert(def.typ.clone(), KindEntry { definition: def, payload, decode });
        Ok(())
    }

    /// Exact canonical type lookup.
    pub fn get(&self, typ: &str) -> Option<&KindEntry> { self.kinds.get(typ) }

    /// Resolve a type or any alias, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&KindEntry> {
        self.kinds.get(name).or_else(|| self.names.get(&name.to_lowercase()).and_then(|t| self.kinds.get(t)))
    }

    pub fn resolve(&self, name: &str) -> Result<&KindEntry, RegistryError> {
        self.lookup(name).ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &KindEntry> {
        self.order.iter().filter_map(|t| self.kinds.get(t))
    }

    pub fn len(&self) -> usize { self.kinds.len() }

    pub fn is_empty(&self) -> bool { self.kinds.is_empty() }
}
