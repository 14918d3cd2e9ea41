//! A runtime described by a RON file, for driving the installer outside of a live VM.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::AtomicUsize;

use parking_lot::{Mutex, RwLock};
use ron::error::SpannedError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dependencies::ClassHierarchy;
use installer_common::ids::{KlassId, MethodId, ObjectAddress, ObjectHandle};
use installer_common::{fatal, guarantee};
use method_table::{CodeCache, MethodTable, StubTable};

use crate::config::InstallerConfig;
use crate::runtime::VmRuntime;

const HANDLE_BASE: u64 = 0x10_0000;

#[derive(Error, Debug)]
pub enum RuntimeDescriptionError {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error(transparent)]
    RonSpanned(#[from] SpannedError),
    #[error("{0} is described twice")]
    Duplicate(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KlassDescription {
    pub id: KlassId,
    pub name: String,
    #[serde(default)]
    pub super_klass: Option<KlassId>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub has_finalizer: bool,
    pub mirror: ObjectAddress,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodDescription {
    pub id: MethodId,
    pub holder: KlassId,
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub parameter_size: u32,
    #[serde(default)]
    pub evolved: bool,
    /// The method this one overrides, if any.
    #[serde(default)]
    pub overrides: Option<MethodId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeDescription {
    #[serde(default)]
    pub klasses: Vec<KlassDescription>,
    #[serde(default)]
    pub methods: Vec<MethodDescription>,
    /// Runtime stub addresses, numbered from 0.
    #[serde(default)]
    pub stubs: Vec<u64>,
    pub resolve_virtual_call_stub: u64,
    pub resolve_static_call_stub: u64,
    pub resolve_opt_virtual_call_stub: u64,
    pub polling_page: u64,
    pub vm_page_size: usize,
    pub non_oop_word: u64,
    pub long_array_klass: KlassId,
    #[serde(default)]
    pub call_site_targets: Vec<(ObjectAddress, ObjectAddress)>,
}

impl RuntimeDescription {
    pub fn load(path: &Path) -> Result<Self, RuntimeDescriptionError> {
        let description_string = std::fs::read_to_string(path)?;
        Ok(ron::from_str(description_string.as_str())?)
    }
}

/// Handle slots 8 bytes apart from `HANDLE_BASE`. Released slots are reused.
#[derive(Debug, Default)]
struct LocalHandles {
    slots: Vec<Option<ObjectAddress>>,
    free: Vec<usize>,
}

impl LocalHandles {
    fn make(&mut self, object: ObjectAddress) -> ObjectHandle {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(object);
                index
            }
            None => {
                self.slots.push(Some(object));
                self.slots.len() - 1
            }
        };
        ObjectHandle(HANDLE_BASE + 8 * index as u64)
    }

    fn index(handle: ObjectHandle) -> Option<usize> {
        let offset = handle.0.checked_sub(HANDLE_BASE)?;
        if offset % 8 != 0 {
            return None;
        }
        Some((offset / 8) as usize)
    }

    fn resolve(&self, handle: ObjectHandle) -> Option<ObjectAddress> {
        self.slots.get(Self::index(handle)?).copied().flatten()
    }

    fn release(&mut self, handle: ObjectHandle) {
        let index = match Self::index(handle) {
            Some(index) if index < self.slots.len() => index,
            _ => fatal!("releasing unknown handle {:#x}", handle.0),
        };
        guarantee!(self.slots[index].take().is_some(), "handle {:#x} released twice", handle.0);
        self.free.push(index);
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

pub struct StandaloneRuntime {
    description: RuntimeDescription,
    klasses: HashMap<KlassId, KlassDescription>,
    methods: HashMap<MethodId, MethodDescription>,
    handles: Mutex<LocalHandles>,
    method_table: RwLock<MethodTable>,
    stub_table: RwLock<StubTable>,
    no_safepoint_depth: AtomicUsize,
}

impl StandaloneRuntime {
    pub fn new(description: RuntimeDescription, config: &InstallerConfig) -> Result<Self, RuntimeDescriptionError> {
        let mut klasses = HashMap::new();
        for klass in description.klasses.iter() {
            if klasses.insert(klass.id, klass.clone()).is_some() {
                return Err(RuntimeDescriptionError::Duplicate(klass.id.to_string()));
            }
        }
        let mut methods = HashMap::new();
        for method in description.methods.iter() {
            if methods.insert(method.id, method.clone()).is_some() {
                return Err(RuntimeDescriptionError::Duplicate(method.id.to_string()));
            }
        }
        let mut stub_table = StubTable::new();
        for stub in description.stubs.iter() {
            stub_table.add_stub(*stub);
        }
        Ok(Self {
            klasses,
            methods,
            handles: Mutex::new(LocalHandles::default()),
            method_table: RwLock::new(MethodTable::new(CodeCache::new(config.code_cache_base, config.code_cache_capacity))),
            stub_table: RwLock::new(stub_table),
            no_safepoint_depth: AtomicUsize::new(0),
            description,
        })
    }

    pub fn load(path: &Path, config: &InstallerConfig) -> Result<Self, RuntimeDescriptionError> {
        Self::new(RuntimeDescription::load(path)?, config)
    }

    /// The object a handle from [`VmRuntime::make_local`] refers to.
    pub fn resolve_handle(&self, handle: ObjectHandle) -> Option<ObjectAddress> {
        self.handles.lock().resolve(handle)
    }

    pub fn live_handles(&self) -> usize {
        self.handles.lock().live()
    }

    fn is_subtype_of(&self, klass: KlassId, of: KlassId) -> bool {
        let mut current = Some(klass);
        while let Some(klass) = current {
            if klass == of {
                return true;
            }
            current = self.klasses.get(&klass).and_then(|description| description.super_klass);
        }
        false
    }

    fn subtypes_including_self(&self, context: KlassId) -> Vec<KlassId> {
        let mut res: Vec<KlassId> = self.klasses.keys().copied().filter(|klass| self.is_subtype_of(*klass, context)).collect();
        res.sort();
        res
    }

    fn is_concrete(&self, klass: KlassId) -> bool {
        self.klasses.get(&klass).map(|description| !description.is_abstract).unwrap_or(false)
    }

    fn overrides(&self, method: MethodId, of: MethodId) -> bool {
        let mut current = Some(method);
        while let Some(method) = current {
            if method == of {
                return true;
            }
            current = self.methods.get(&method).and_then(|description| description.overrides);
        }
        false
    }
}

impl ClassHierarchy for StandaloneRuntime {
    fn is_abstract(&self, klass: KlassId) -> bool {
        self.klasses.get(&klass).map(|description| description.is_abstract).unwrap_or(false)
    }

    fn subclasses(&self, klass: KlassId) -> Vec<KlassId> {
        self.subtypes_including_self(klass).into_iter().filter(|subtype| *subtype != klass).collect()
    }

    fn unique_concrete_subtype(&self, context: KlassId) -> Option<KlassId> {
        let concrete: Vec<KlassId> = self.subtypes_including_self(context).into_iter().filter(|klass| self.is_concrete(*klass)).collect();
        match concrete.as_slice() {
            [only] => Some(*only),
            _ => None
        }
    }

    fn unique_concrete_method(&self, context: KlassId, method: MethodId) -> Option<MethodId> {
        let root = self.methods.get(&method)?;
        let mut root_method = root.id;
        while let Some(overridden) = self.methods.get(&root_method).and_then(|description| description.overrides) {
            root_method = overridden;
        }
        let mut implementations: Vec<MethodId> = self.methods.values()
            .filter(|candidate| self.overrides(candidate.id, root_method))
            .filter(|candidate| self.is_subtype_of(candidate.holder, context) || self.is_subtype_of(context, candidate.holder))
            .filter(|candidate| self.is_concrete(candidate.holder))
            .map(|candidate| candidate.id)
            .collect();
        implementations.sort();
        match implementations.as_slice() {
            [only] => Some(*only),
            _ => None
        }
    }

    fn has_finalizable_subclass(&self, klass: KlassId) -> bool {
        self.subtypes_including_self(klass).into_iter().any(|subtype| self.klasses.get(&subtype).map(|description| description.has_finalizer).unwrap_or(false))
    }

    fn call_site_target(&self, call_site: ObjectAddress) -> Option<ObjectAddress> {
        self.description.call_site_targets.iter().find(|(site, _)| *site == call_site).map(|(_, target)| *target)
    }

    fn is_method_evolved(&self, method: MethodId) -> bool {
        self.methods.get(&method).map(|description| description.evolved).unwrap_or(false)
    }
}

impl VmRuntime for StandaloneRuntime {
    fn method_table(&self) -> &RwLock<MethodTable> {
        &self.method_table
    }

    fn stub_table(&self) -> &RwLock<StubTable> {
        &self.stub_table
    }

    fn resolve_virtual_call_stub(&self) -> u64 {
        self.description.resolve_virtual_call_stub
    }

    fn resolve_static_call_stub(&self) -> u64 {
        self.description.resolve_static_call_stub
    }

    fn resolve_opt_virtual_call_stub(&self) -> u64 {
        self.description.resolve_opt_virtual_call_stub
    }

    fn polling_page(&self) -> u64 {
        self.description.polling_page
    }

    fn vm_page_size(&self) -> usize {
        self.description.vm_page_size
    }

    fn non_oop_word(&self) -> u64 {
        self.description.non_oop_word
    }

    fn make_local(&self, object: ObjectAddress) -> ObjectHandle {
        self.handles.lock().make(object)
    }

    fn release_local(&self, handle: ObjectHandle) {
        self.handles.lock().release(handle)
    }

    fn java_mirror(&self, klass: KlassId) -> ObjectAddress {
        match self.klasses.get(&klass) {
            Some(description) => description.mirror,
            None => installer_common::fatal!("no mirror for unknown type {}", klass)
        }
    }

    fn long_array_klass(&self) -> KlassId {
        self.description.long_array_klass
    }

    fn is_static(&self, method: MethodId) -> bool {
        self.methods.get(&method).map(|description| description.is_static).unwrap_or(false)
    }

    fn size_of_parameters(&self, method: MethodId) -> u32 {
        self.methods.get(&method).map(|description| description.parameter_size).unwrap_or(0)
    }

    fn no_safepoint_depth(&self) -> &AtomicUsize {
        &self.no_safepoint_depth
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use installer_common::ids::{KlassId, MethodId, ObjectAddress};

    use dependencies::ClassHierarchy;

    use crate::config::InstallerConfig;
    use crate::runtime::{NoSafepointScope, VmRuntime};
    use crate::standalone::{RuntimeDescription, StandaloneRuntime};

    pub(crate) const RUNTIME: &str = r#"(
        klasses: [
            (id: (0x100), name: "Shape", is_abstract: true, mirror: (0x9100)),
            (id: (0x200), name: "Circle", super_klass: Some((0x100)), mirror: (0x9200)),
            (id: (0x300), name: "[J", mirror: (0x9300)),
            (id: (0x400), name: "Node", mirror: (0x9400)),
        ],
        methods: [
            (id: (0x1000), holder: (0x100), name: "area", parameter_size: 1),
            (id: (0x2000), holder: (0x200), name: "area", parameter_size: 1, overrides: Some((0x1000))),
            (id: (0x3000), holder: (0x200), name: "unit", is_static: true),
        ],
        stubs: [0x70000000, 0x70000100],
        resolve_virtual_call_stub: 0x71000000,
        resolve_static_call_stub: 0x71000100,
        resolve_opt_virtual_call_stub: 0x71000200,
        polling_page: 0x72000000,
        vm_page_size: 4096,
        non_oop_word: 0xffffffffffffffff,
        long_array_klass: (0x300),
    )"#;

    pub(crate) fn runtime() -> StandaloneRuntime {
        let description: RuntimeDescription = ron::from_str(RUNTIME).unwrap();
        StandaloneRuntime::new(description, &InstallerConfig::default()).unwrap()
    }

    #[test]
    fn hierarchy_queries() {
        let runtime = runtime();
        assert_eq!(runtime.subclasses(KlassId(0x100)), vec![KlassId(0x200)]);
        assert_eq!(runtime.unique_concrete_subtype(KlassId(0x100)), Some(KlassId(0x200)));
        assert_eq!(runtime.unique_concrete_method(KlassId(0x100), MethodId(0x1000)), Some(MethodId(0x2000)));
        assert!(!runtime.has_finalizable_subclass(KlassId(0x100)));
        assert!(runtime.is_static(MethodId(0x3000)));
    }

    #[test]
    fn stubs_and_handles() {
        let runtime = runtime();
        assert_eq!(runtime.runtime_stub_address(1), Some(0x7000_0100));
        let handle = runtime.make_local(ObjectAddress(0x5000));
        assert_eq!(runtime.resolve_handle(handle), Some(ObjectAddress(0x5000)));
        runtime.release_local(handle);
        assert_eq!(runtime.resolve_handle(handle), None);
        assert_eq!(runtime.live_handles(), 0);
        assert_eq!(runtime.make_local(ObjectAddress(0x6000)), handle);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn handles_are_released_once() {
        let runtime = runtime();
        let handle = runtime.make_local(ObjectAddress(0x5000));
        runtime.release_local(handle);
        runtime.release_local(handle);
    }

    #[test]
    fn no_safepoint_scope_nests() {
        let runtime = runtime();
        assert!(runtime.is_safepoint_allowed());
        {
            let _outer = NoSafepointScope::enter(&runtime);
            let _inner = NoSafepointScope::enter(&runtime);
            assert!(!runtime.is_safepoint_allowed());
        }
        assert!(runtime.is_safepoint_allowed());
    }
}
