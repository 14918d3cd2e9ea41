use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use code_buffer::CodeBuffer;
use code_buffer::code_offsets::CodeOffsets;
use debug_info::exception_table::{ExceptionHandlerTable, ImplicitExceptionTable};
use debug_info::PcDesc;
use dependencies::Dependencies;
use installer_common::align_up;
use installer_common::ids::{InstalledCodeId, Metadata, MethodId, ObjectHandle};
use oop_map::OopMapSet;

pub const CODE_ENTRY_ALIGNMENT: usize = 64;

/// Everything produced by one installation, before it has an address.
#[derive(Debug)]
pub struct NewCode {
    pub name: String,
    /// `None` for runtime stubs.
    pub method: Option<MethodId>,
    pub entry_bci: i32,
    pub code: CodeBuffer,
    pub code_offsets: CodeOffsets,
    /// In bytes, including the return address.
    pub total_frame_size: usize,
    pub custom_stack_area_offset: i32,
    pub oop_maps: OopMapSet,
    pub pcs: Vec<PcDesc>,
    pub exception_handlers: ExceptionHandlerTable,
    pub implicit_exceptions: ImplicitExceptionTable,
    pub dependencies: Dependencies,
    pub metadata: Vec<Metadata>,
    pub oops: Vec<ObjectHandle>,
}

#[derive(Debug)]
pub struct InstalledCode {
    pub id: InstalledCodeId,
    pub name: String,
    pub method: Option<MethodId>,
    pub entry_bci: i32,
    pub code: CodeBuffer,
    pub code_offsets: CodeOffsets,
    pub total_frame_size: usize,
    pub custom_stack_area_offset: i32,
    pub oop_maps: OopMapSet,
    pub pcs: Vec<PcDesc>,
    pub exception_handlers: ExceptionHandlerTable,
    pub implicit_exceptions: ImplicitExceptionTable,
    pub dependencies: Dependencies,
    pub metadata: Vec<Metadata>,
    pub oops: Vec<ObjectHandle>,
}

impl InstalledCode {
    pub fn address(&self) -> u64 {
        self.code.base()
    }

    pub fn verified_entry_point(&self) -> u64 {
        self.address() + self.code_offsets.verified_entry() as u64
    }

    pub fn is_osr(&self) -> bool {
        self.entry_bci != -1
    }

    pub fn is_stub(&self) -> bool {
        self.method.is_none()
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("code cache full: {requested} bytes requested, {free} free")]
pub struct CodeCacheFull {
    pub requested: usize,
    pub free: usize,
}

/// Bump allocator over the address range code is installed into.
#[derive(Debug)]
pub struct CodeCache {
    base: u64,
    capacity: usize,
    used: usize,
}

impl CodeCache {
    pub fn new(base: u64, capacity: usize) -> Self {
        Self { base, capacity, used: 0 }
    }

    /// `alignment` applies to the returned address, not to the offset into the cache.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Result<u64, CodeCacheFull> {
        let alignment = alignment.max(CODE_ENTRY_ALIGNMENT);
        let start = align_up(self.base as usize + self.used, alignment) - self.base as usize;
        if start + size > self.capacity {
            return Err(CodeCacheFull { requested: size, free: self.capacity.saturating_sub(start) });
        }
        self.used = start + size;
        Ok(self.base + start as u64)
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

pub struct MethodTable {
    table: Vec<Arc<InstalledCode>>,
    code_cache: CodeCache,
    //latest normal entry code per method
    index: HashMap<MethodId, InstalledCodeId>,
    osr_index: HashMap<(MethodId, i32), InstalledCodeId>,
    stubs: HashMap<String, InstalledCodeId>,
}

impl MethodTable {
    pub fn new(code_cache: CodeCache) -> Self {
        Self {
            table: vec![],
            code_cache,
            index: HashMap::new(),
            osr_index: HashMap::new(),
            stubs: HashMap::new(),
        }
    }

    /// Moves `new_code` into the code cache and makes it reachable.
    pub fn register(&mut self, new_code: NewCode) -> Result<InstalledCodeId, CodeCacheFull> {
        let NewCode {
            name,
            method,
            entry_bci,
            mut code,
            code_offsets,
            total_frame_size,
            custom_stack_area_offset,
            oop_maps,
            pcs,
            exception_handlers,
            implicit_exceptions,
            dependencies,
            metadata,
            oops
        } = new_code;
        // the constants section keeps its alignment only if the blob start has at least as much
        let address = self.code_cache.allocate(code.blob_size(), code.consts().alignment())?;
        code.move_to(address);
        let id = InstalledCodeId(self.table.len());
        match method {
            Some(method) if entry_bci == -1 => {
                self.index.insert(method, id);
            }
            Some(method) => {
                self.osr_index.insert((method, entry_bci), id);
            }
            None => {
                self.stubs.insert(name.clone(), id);
            }
        }
        info!(id = id.0, %name, address = format!("{:#x}", address).as_str(), size = code.blob_size(), "installed");
        self.table.push(Arc::new(InstalledCode {
            id,
            name,
            method,
            entry_bci,
            code,
            code_offsets,
            total_frame_size,
            custom_stack_area_offset,
            oop_maps,
            pcs,
            exception_handlers,
            implicit_exceptions,
            dependencies,
            metadata,
            oops,
        }));
        Ok(id)
    }

    pub fn try_lookup(&self, id: InstalledCodeId) -> Option<Arc<InstalledCode>> {
        self.table.get(id.0).cloned()
    }

    pub fn verified_entry_point(&self, id: InstalledCodeId) -> Option<u64> {
        self.table.get(id.0).map(|code| code.verified_entry_point())
    }

    pub fn code_for_method(&self, method: MethodId) -> Option<Arc<InstalledCode>> {
        self.index.get(&method).and_then(|id| self.try_lookup(*id))
    }

    pub fn osr_code_for_method(&self, method: MethodId, entry_bci: i32) -> Option<Arc<InstalledCode>> {
        self.osr_index.get(&(method, entry_bci)).and_then(|id| self.try_lookup(*id))
    }

    pub fn stub(&self, name: &str) -> Option<Arc<InstalledCode>> {
        self.stubs.get(name).and_then(|id| self.try_lookup(*id))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=&Arc<InstalledCode>> {
        self.table.iter()
    }
}

/// Addresses of runtime stubs, by the id compiled code refers to them with.
#[derive(Debug, Default)]
pub struct StubTable {
    addresses: Vec<u64>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stub(&mut self, address: u64) -> i64 {
        self.addresses.push(address);
        (self.addresses.len() - 1) as i64
    }

    pub fn get_stub(&self, id: i64) -> Option<u64> {
        usize::try_from(id).ok().and_then(|index| self.addresses.get(index).copied())
    }
}
