//! Typed resources: one metadata/versioning/copy/equality model over arbitrary spec payloads.
//!
//! A kind is a spec type `T: ResourceSpec` plus a zero-sized definition provider
//! `RD: ResourceDefinitionProvider<T>`. `TypedResource<T, RD>` binds them to a `Metadata`.
//! The object-safe [`Resource`] trait lets stores and renderers handle any kind uniformly.

#![forbid(unsafe_code)]

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::definition::ResourceDefinitionSpec;
use crate::metadata::{Id, Metadata, Namespace, Version};

/// Kind-specific payload.
///
/// `deep_copy` must return a value that shares no mutable state with `self`.
/// The default delegates to `Clone`, which holds for owned data; kinds holding
/// shared handles (`Arc<Mutex<_>>` and friends) must override it.
pub trait ResourceSpec:
    Sized + fmt::Debug + Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn deep_copy(&self) -> Self { self.clone() }
}

/// Self-description of a kind.
///
/// Implementations must be pure: the returned `typ` and `default_namespace`
/// never depend on the instance passed in.
pub trait ResourceDefinitionProvider<T>: 'static {
    /// Registered type of the kind, e.g. `ExtensionStatuses.runtime.talos.dev`.
    const TYPE: &'static str;

    fn resource_definition(md: &Metadata, spec: &T) -> ResourceDefinitionSpec;
}

pub struct TypedResource<T, RD> {
    md: Metadata,
    spec: T,
    _rd: PhantomData<fn() -> RD>,
}

impl<T: ResourceSpec, RD> TypedResource<T, RD> {
    pub fn new(md: Metadata, spec: T) -> Self {
        Self { md, spec, _rd: PhantomData }
    }

    pub fn metadata(&self) -> &Metadata { &self.md }

    pub fn metadata_mut(&mut self) -> &mut Metadata { &mut self.md }

    pub fn spec(&self) -> &T { &self.spec }

    pub fn spec_mut(&mut self) -> &mut T { &mut self.spec }

    /// Replace the payload. Does not touch the version.
    pub fn set_spec(&mut self, spec: T) { self.spec = spec; }

    pub fn into_parts(self) -> (Metadata, T) { (self.md, self.spec) }

    /// Independent copy: metadata by value, spec through `ResourceSpec::deep_copy`.
    pub fn deep_copy(&self) -> Self {
        Self { md: self.md.clone(), spec: self.spec.deep_copy(), _rd: PhantomData }
    }
}

impl<T: ResourceSpec, RD: ResourceDefinitionProvider<T>> TypedResource<T, RD> {
    /// Fresh resource of this kind with an undefined version.
    pub fn with_id(namespace: impl Into<Namespace>, id: impl Into<Id>, spec: T) -> Self {
        Self::new(Metadata::new(namespace, RD::TYPE, id, Version::UNDEFINED), spec)
    }

    pub fn resource_definition(&self) -> ResourceDefinitionSpec {
        RD::resource_definition(&self.md, &self.spec)
    }
}

impl<T: ResourceSpec, RD> Clone for TypedResource<T, RD> {
    fn clone(&self) -> Self { self.deep_copy() }
}

impl<T: ResourceSpec, RD> PartialEq for TypedResource<T, RD> {
    fn eq(&self, other: &Self) -> bool {
        self.md == other.md && self.spec == other.spec
    }
}

impl<T: ResourceSpec + Eq, RD> Eq for TypedResource<T, RD> {}

impl<T: ResourceSpec, RD> fmt::Debug for TypedResource<T, RD> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedResource").field("metadata", &self.md).field("spec", &self.spec).finish()
    }
}

/// Kind-erased view of a resource.
pub trait Resource: fmt::Debug + Send + Sync + 'static {
    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    fn deep_copy(&self) -> Box<dyn Resource>;

    fn resource_definition(&self) -> ResourceDefinitionSpec;

    /// Spec rendered as JSON, the view print columns are evaluated against.
    fn spec_value(&self) -> serde_json::Value;

    /// True if `other` is the same kind and holds an equal spec.
    fn spec_eq(&self, other: &dyn Resource) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: ResourceSpec, RD: ResourceDefinitionProvider<T>> Resource for TypedResource<T, RD> {
    fn metadata(&self) -> &Metadata { &self.md }

    fn metadata_mut(&mut self) -> &mut Metadata { &mut self.md }

    fn deep_copy(&self) -> Box<dyn Resource> { Box::new(TypedResource::<T, RD>::deep_copy(self)) }

    fn resource_definition(&self) -> ResourceDefinitionSpec {
        RD::resource_definition(&self.md, &self.spec)
    }

    fn spec_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.spec).unwrap_or_else(|err| {
            debug!(key = %self.md.key(), error = %err, "spec does not render as JSON");
            serde_json::Value::Null
        })
    }

    fn spec_eq(&self, other: &dyn Resource) -> bool {
        other.as_any().downcast_ref::<Self>().map(|o| o.spec == self.spec).unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

impl PartialEq for dyn Resource {
    fn eq(&self, other: &Self) -> bool {
        self.metadata() == other.metadata() && self.spec_eq(other)
    }
}

impl Clone for Box<dyn Resource> {
    fn clone(&self) -> Self { self.as_ref().deep_copy() }
}

impl dyn Resource {
    pub fn downcast_ref<R: Resource>(&self) -> Option<&R> { self.as_any().downcast_ref::<R>() }

    pub fn downcast_mut<R: Resource>(&mut self) -> Option<&mut R> { self.as_any_mut().downcast_mut::<R>() }
}
