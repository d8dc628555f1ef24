#![forbid(unsafe_code)]

use std::sync::Arc;

use keel_core::{Metadata, PrintColumn, Version};
use keel_runtime::extensions::{Compatibility, Constraint, Layer, Metadata as LayerMetadata};
use keel_runtime::{new_extension_status, ExtensionStatus, ExtensionStatusRD, ExtensionStatusSpec, EXTENSION_STATUS_TYPE, NAMESPACE_NAME};
use keel_schema::{Table, TableSpec};
use keel_store::{Registry, State};

fn gvisor() -> Layer {
    Layer {
        image: "000.gvisor.sqsh".into(),
        metadata: LayerMetadata {
            name: "gvisor".into(),
            version: "20220405.0-v1.0.0".into(),
            author: "Extension Maintainers".into(),
            description: "gVisor container runtime".into(),
            compatibility: Compatibility { talos: Constraint { version: ">= v1.0.0".into() } },
        },
    }
}

#[test]
fn new_status_scenario() {
    let r = new_extension_status(NAMESPACE_NAME, "hello-world");
    let md = r.metadata();
    assert_eq!(md.namespace(), "runtime");
    assert_eq!(md.typ(), "ExtensionStatuses.runtime.talos.dev");
    assert_eq!(md.id(), "hello-world");
    assert_eq!(md.version(), Version::UNDEFINED);
    assert_eq!(r.spec(), &ExtensionStatusSpec::default());

    let def = r.resource_definition();
    assert_eq!(def.typ, EXTENSION_STATUS_TYPE);
    assert_eq!(def.aliases, vec!["extensions".to_string()]);
    assert_eq!(def.default_namespace, "runtime");
    assert_eq!(
        def.print_columns,
        vec![PrintColumn::new("Name", "{.metadata.name}"), PrintColumn::new("Version", "{.metadata.version}")]
    );
}

#[test]
fn deep_copy_is_independent_both_ways() {
    let mut r = ExtensionStatus::with_id(NAMESPACE_NAME, "0", gvisor());
    let mut copy = r.deep_copy();

    copy.spec_mut().metadata.compatibility.talos.version = ">= v2.0.0".into();
    assert_eq!(r.spec().metadata.compatibility.talos.version, ">= v1.0.0");

    r.spec_mut().image.clear();
    assert_eq!(copy.spec().image, "000.gvisor.sqsh");
}

#[test]
fn equality_follows_copies_and_mutation() {
    let r = ExtensionStatus::with_id(NAMESPACE_NAME, "0", gvisor());
    let mut copy = r.deep_copy();
    assert_eq!(r, copy);
    assert_eq!(copy.metadata(), r.metadata());

    copy.spec_mut().metadata.name = "other".into();
    assert_ne!(r, copy);

    // same identity, different version: not equal
    let mut bumped = r.deep_copy();
    bumped.metadata_mut().set_version(Version::new(1));
    assert_ne!(r, bumped);
}

#[test]
fn definition_is_instance_independent() {
    let a = new_extension_status(NAMESPACE_NAME, "a");
    let b = ExtensionStatus::with_id("elsewhere", "b", gvisor());
    let (da, db) = (a.resource_definition(), b.resource_definition());
    assert_eq!(da, db);
    assert_eq!(da, a.resource_definition());
    assert!(!da.aliases.contains(&da.typ));

    let md = Metadata::new("x", EXTENSION_STATUS_TYPE, "y", Version::new(7));
    let dc = <ExtensionStatusRD as keel_core::ResourceDefinitionProvider<Layer>>::resource_definition(&md, &gvisor());
    assert_eq!(dc.typ, da.typ);
    assert_eq!(dc.default_namespace, da.default_namespace);
}

#[test]
fn registry_resolves_extension_aliases() {
    let mut reg = Registry::new();
    keel_runtime::register(&mut reg).unwrap();
    for name in ["extensions", "ExtensionStatuses.runtime.talos.dev", "extensionstatus", "es"] {
        assert_eq!(reg.resolve(name).unwrap().typ(), EXTENSION_STATUS_TYPE, "{}", name);
    }
    let def = reg.get(EXTENSION_STATUS_TYPE).unwrap().definition();
    assert_eq!(def.display_type, "ExtensionStatus");
}

#[test]
fn table_renders_name_and_version() {
    let mut reg = Registry::new();
    keel_runtime::register(&mut reg).unwrap();
    let st = State::new(Arc::new(reg));

    st.create(Box::new(ExtensionStatus::with_id(NAMESPACE_NAME, "0", gvisor()))).unwrap();
    st.create(Box::new(new_extension_status(NAMESPACE_NAME, "1"))).unwrap();

    let items = st.list(NAMESPACE_NAME, EXTENSION_STATUS_TYPE);
    let spec = TableSpec::for_definition(&items[0].resource_definition());
    let table = Table::build(&spec, items.iter().map(|r| &**r));
    assert_eq!(table.headers, vec!["NAMESPACE", "TYPE", "ID", "VERSION", "NAME", "VERSION"]);
    assert_eq!(table.rows[0], vec!["runtime", EXTENSION_STATUS_TYPE, "0", "1", "gvisor", "20220405.0-v1.0.0"]);
    // empty spec renders empty cells rather than failing
    assert_eq!(table.rows[1], vec!["runtime", EXTENSION_STATUS_TYPE, "1", "1", "", ""]);
}

#[test]
fn layer_manifest_decodes() {
    let yaml = r#"
version: v1alpha1
name: gvisor
author: Extension Maintainers
description: gVisor container runtime
compatibility:
  talos:
    version: ">= v1.0.0"
"#;
    let md: LayerMetadata = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(md.name, "gvisor");
    assert_eq!(md.compatibility.talos.version, ">= v1.0.0");

    let partial: Layer = serde_json::from_value(serde_json::json!({ "image": "x.sqsh" })).unwrap();
    assert_eq!(partial.image, "x.sqsh");
    assert_eq!(partial.metadata, LayerMetadata::default());
}
