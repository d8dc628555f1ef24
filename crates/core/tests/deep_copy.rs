#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use keel_core::{Metadata, Resource, ResourceDefinitionProvider, ResourceDefinitionSpec, ResourceSpec, TypedResource, Version};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Route {
    gateway: String,
    metrics: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RouteTableSpec {
    routes: Vec<Route>,
    by_link: BTreeMap<String, Vec<Route>>,
    note: Option<Box<String>>,
}

impl ResourceSpec for RouteTableSpec {}

struct RouteTableRD;

impl ResourceDefinitionProvider<RouteTableSpec> for RouteTableRD {
    const TYPE: &'static str = "RouteTables.net.test.dev";

    fn resource_definition(_: &Metadata, _: &RouteTableSpec) -> ResourceDefinitionSpec {
        ResourceDefinitionSpec { typ: Self::TYPE.into(), default_namespace: "network".into(), ..Default::default() }
    }
}

type RouteTable = TypedResource<RouteTableSpec, RouteTableRD>;

fn sample() -> RouteTable {
    let route = Route { gateway: "10.0.0.1".into(), metrics: vec![100, 200] };
    let mut by_link = BTreeMap::new();
    by_link.insert("eth0".to_string(), vec![route.clone()]);
    let mut r = RouteTable::with_id("network", "main", RouteTableSpec {
        routes: vec![route],
        by_link,
        note: Some(Box::new("static".into())),
    });
    r.metadata_mut().set_version(Version::new(3));
    r.metadata_mut().set_label("link", "eth0");
    r
}

#[test]
fn nested_mutation_of_copy_leaves_original() {
    let orig = sample();
    let mut copy = orig.deep_copy();

    copy.spec_mut().routes[0].metrics.push(300);
    copy.spec_mut().by_link.get_mut("eth0").unwrap()[0].gateway = "10.0.0.254".into();
    if let Some(note) = copy.spec_mut().note.as_mut() {
        note.push_str("-edited");
    }

    assert_eq!(orig.spec().routes[0].metrics, vec![100, 200]);
    assert_eq!(orig.spec().by_link["eth0"][0].gateway, "10.0.0.1");
    assert_eq!(orig.spec().note.as_deref().map(String::as_str), Some("static"));
}

#[test]
fn nested_mutation_of_original_leaves_copy() {
    let mut orig = sample();
    let copy = orig.deep_copy();

    orig.spec_mut().by_link.clear();
    orig.spec_mut().routes.clear();

    assert_eq!(copy.spec().by_link.len(), 1);
    assert_eq!(copy.spec().routes.len(), 1);
}

#[test]
fn copy_preserves_identity() {
    let orig = sample();
    let copy = orig.deep_copy();
    let (a, b) = (orig.metadata(), copy.metadata());
    assert_eq!(a.namespace(), b.namespace());
    assert_eq!(a.typ(), b.typ());
    assert_eq!(a.id(), b.id());
    assert_eq!(a.version(), b.version());
    assert_eq!(a.labels(), b.labels());
    assert_eq!(orig, copy);
}

#[test]
fn equality_breaks_after_independent_mutation() {
    let orig = sample();
    let mut copy = orig.clone();
    assert_eq!(orig, copy);
    copy.spec_mut().routes[0].metrics[0] = 1;
    assert_ne!(orig, copy);

    let mut relabeled = orig.clone();
    relabeled.metadata_mut().set_label("link", "eth1");
    assert_ne!(orig, relabeled);
}

#[test]
fn boxed_copies_are_independent() {
    let boxed: Box<dyn Resource> = Box::new(sample());
    let mut copy = boxed.deep_copy();
    copy.downcast_mut::<RouteTable>().unwrap().spec_mut().routes.clear();
    assert_eq!(boxed.downcast_ref::<RouteTable>().unwrap().spec().routes.len(), 1);
    assert!(*boxed != *copy);
    assert_eq!(boxed.spec_value()["routes"][0]["gateway"], "10.0.0.1");
}

/// Spec holding a shared handle, so `Clone` alone would alias the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuditSpec {
    name: String,
    #[serde(skip)]
    log: Arc<Mutex<Vec<String>>>,
}

impl AuditSpec {
    fn entries(&self) -> Vec<String> { self.log.lock().unwrap_or_else(PoisonError::into_inner).clone() }

    fn push(&self, entry: &str) { self.log.lock().unwrap_or_else(PoisonError::into_inner).push(entry.into()) }
}

impl PartialEq for AuditSpec {
    fn eq(&self, other: &Self) -> bool { self.name == other.name && self.entries() == other.entries() }
}

impl ResourceSpec for AuditSpec {
    fn deep_copy(&self) -> Self {
        Self { name: self.name.clone(), log: Arc::new(Mutex::new(self.entries())) }
    }
}

struct AuditRD;

impl ResourceDefinitionProvider<AuditSpec> for AuditRD {
    const TYPE: &'static str = "Audits.test.dev";

    fn resource_definition(_: &Metadata, _: &AuditSpec) -> ResourceDefinitionSpec {
        ResourceDefinitionSpec { typ: Self::TYPE.into(), default_namespace: "test".into(), ..Default::default() }
    }
}

type Audit = TypedResource<AuditSpec, AuditRD>;

fn audit() -> Audit {
    let spec = AuditSpec { name: "boot".into(), ..Default::default() };
    spec.push("started");
    Audit::with_id("test", "boot", spec)
}

#[test]
fn kind_copy_function_is_used_for_shared_handles() {
    let orig = audit();

    let copy = orig.deep_copy();
    assert!(!Arc::ptr_eq(&orig.spec().log, &copy.spec().log));
    copy.spec().push("typed");
    assert_eq!(orig.spec().entries(), vec!["started".to_string()]);

    let cloned = orig.clone();
    cloned.spec().push("cloned");
    assert_eq!(orig.spec().entries(), vec!["started".to_string()]);

    let boxed: Box<dyn Resource> = Box::new(orig.deep_copy());
    let erased = boxed.deep_copy();
    erased.downcast_ref::<Audit>().unwrap().spec().push("erased");
    let reboxed = boxed.clone();
    reboxed.downcast_ref::<Audit>().unwrap().spec().push("reboxed");
    assert_eq!(boxed.downcast_ref::<Audit>().unwrap().spec().entries(), vec!["started".to_string()]);
    assert_eq!(orig.spec().entries(), vec!["started".to_string()]);

    assert_eq!(orig, orig.deep_copy());
    assert_ne!(orig, copy);
}
