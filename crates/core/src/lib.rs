//! Keel core types: resource metadata, typed resources and resource definitions.

#![forbid(unsafe_code)]

pub mod definition;
pub mod metadata;
pub mod resource;

pub use definition::{DefinitionError, PrintColumn, ResourceDefinitionSpec};
pub use metadata::{Id, Metadata, Namespace, ParseVersionError, Phase, ResourceKey, ResourceType, Version};
pub use resource::{Resource, ResourceDefinitionProvider, ResourceSpec, TypedResource};

pub mod prelude {
    pub use super::{
        Metadata, Phase, PrintColumn, Resource, ResourceDefinitionProvider, ResourceDefinitionSpec, ResourceKey,
        ResourceSpec, TypedResource, Version,
    };
}
