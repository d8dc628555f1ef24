//! Keel runtime resources.

#![forbid(unsafe_code)]

pub mod extension_status;
pub mod extensions;

use keel_store::{Registry, RegistryError};

pub use extension_status::{new_extension_status, ExtensionStatus, ExtensionStatusRD, ExtensionStatusSpec, EXTENSION_STATUS_TYPE};

/// Namespace holding runtime resources.
pub const NAMESPACE_NAME: &str = "runtime";

/// Register every runtime kind.
pub fn register(reg: &mut Registry) -> Result<(), RegistryError> {
    reg.register::<ExtensionStatusSpec, ExtensionStatusRD>()
}
