//! What the installer needs from the runtime it installs into.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use dependencies::ClassHierarchy;
use installer_common::ids::{KlassId, MethodId, ObjectAddress, ObjectHandle};
use method_table::{MethodTable, StubTable};

pub trait VmRuntime: ClassHierarchy + Send + Sync {
    fn method_table(&self) -> &RwLock<MethodTable>;
    fn stub_table(&self) -> &RwLock<StubTable>;

    fn resolve_virtual_call_stub(&self) -> u64;
    fn resolve_static_call_stub(&self) -> u64;
    fn resolve_opt_virtual_call_stub(&self) -> u64;

    fn polling_page(&self) -> u64;
    fn vm_page_size(&self) -> usize;
    /// Inline caches start out holding this, a value no type can have.
    fn non_oop_word(&self) -> u64;

    /// A handle that keeps `object` reachable from installed code.
    fn make_local(&self, object: ObjectAddress) -> ObjectHandle;
    /// Gives back a handle no installed code refers to.
    fn release_local(&self, handle: ObjectHandle);
    fn java_mirror(&self, klass: KlassId) -> ObjectAddress;
    fn long_array_klass(&self) -> KlassId;

    fn is_static(&self, method: MethodId) -> bool;
    fn size_of_parameters(&self, method: MethodId) -> u32;

    fn no_safepoint_depth(&self) -> &AtomicUsize;

    fn runtime_stub_address(&self, stub_id: i64) -> Option<u64> {
        self.stub_table().read().get_stub(stub_id)
    }

    fn is_safepoint_allowed(&self) -> bool {
        self.no_safepoint_depth().load(Ordering::SeqCst) == 0
    }
}

/// While alive, the collector may not run. Raw object addresses taken from compiler output are
/// only valid inside this scope.
pub struct NoSafepointScope<'vm> {
    depth: &'vm AtomicUsize,
}

impl<'vm> NoSafepointScope<'vm> {
    pub fn enter(runtime: &'vm dyn VmRuntime) -> Self {
        let depth = runtime.no_safepoint_depth();
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for NoSafepointScope<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
