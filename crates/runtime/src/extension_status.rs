//! Status of installed system extensions.

use keel_core::{Metadata, PrintColumn, ResourceDefinitionProvider, ResourceDefinitionSpec, ResourceSpec, TypedResource};

use crate::extensions::Layer;
use crate::NAMESPACE_NAME;

pub const EXTENSION_STATUS_TYPE: &str = "ExtensionStatuses.runtime.talos.dev";

pub type ExtensionStatusSpec = Layer;

impl ResourceSpec for Layer {}

pub type ExtensionStatus = TypedResource<ExtensionStatusSpec, ExtensionStatusRD>;

pub struct ExtensionStatusRD;

impl ResourceDefinitionProvider<ExtensionStatusSpec> for ExtensionStatusRD {
    const TYPE: &'static str = EXTENSION_STATUS_TYPE;

    fn resource_definition(_: &Metadata, _: &ExtensionStatusSpec) -> ResourceDefinitionSpec {
        ResourceDefinitionSpec {
            typ: EXTENSION_STATUS_TYPE.to_string(),
            aliases: vec!["extensions".to_string()],
            default_namespace: NAMESPACE_NAME.to_string(),
            print_columns: vec![
                PrintColumn::new("Name", "{.metadata.name}"),
                PrintColumn::new("Version", "{.metadata.version}"),
            ],
            ..Default::default()
        }
    }
}

/// Empty extension status with an undefined version.
pub fn new_extension_status(namespace: &str, id: &str) -> ExtensionStatus {
    ExtensionStatus::with_id(namespace, id, ExtensionStatusSpec::default())
}
