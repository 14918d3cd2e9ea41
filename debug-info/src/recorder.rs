//! Per-safepoint scope chains.
//!
//! A safepoint is opened with [`DebugInformationRecorder::add_safepoint`], described outermost
//! frame first with [`DebugInformationRecorder::describe_scope`], and closed with
//! [`DebugInformationRecorder::end_safepoint`]. Readers walk the chain innermost first.

use std::fmt::{Display, Formatter};

use itertools::Itertools;
use tracing::debug;

use installer_common::guarantee;
use installer_common::ids::MethodId;
use oop_map::{OopMap, OopMapSet};

use crate::scope_value::{MonitorValue, ObjectPool, ScopeValue};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScopeDesc {
    pub method: MethodId,
    pub bci: i32,
    pub reexecute: bool,
    pub rethrow_exception: bool,
    pub locals: Vec<ScopeValue>,
    pub expressions: Vec<ScopeValue>,
    pub monitors: Vec<MonitorValue>,
}

impl Display for ScopeDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.method, self.bci)?;
        if self.reexecute {
            write!(f, " reexecute")?;
        }
        if self.rethrow_exception {
            write!(f, " rethrow")?;
        }
        write!(f, " locals=[{}] stack=[{}] locks=[{}]", self.locals.iter().join(", "), self.expressions.iter().join(", "), self.monitors.iter().join(", "))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PcDesc {
    pub pc_offset: usize,
    pub leaf_graph_id: i64,
    // outermost first
    scopes: Vec<ScopeDesc>,
    objects: ObjectPool,
}

impl PcDesc {
    /// The inlining chain, innermost frame first.
    pub fn scopes(&self) -> impl Iterator<Item=&ScopeDesc> {
        self.scopes.iter().rev()
    }

    pub fn innermost(&self) -> Option<&ScopeDesc> {
        self.scopes.last()
    }

    pub fn objects(&self) -> &ObjectPool {
        &self.objects
    }
}

#[derive(Debug, Default)]
pub struct DebugInformationRecorder {
    oop_maps: OopMapSet,
    pcs: Vec<PcDesc>,
    current: Option<PcDesc>,
}

impl DebugInformationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_safepoint(&mut self, pc_offset: usize, leaf_graph_id: i64, oop_map: OopMap) {
        guarantee!(self.current.is_none(), "safepoint at {} opened while another is in progress", pc_offset);
        if let Some(last) = self.pcs.last() {
            guarantee!(last.pc_offset < pc_offset, "safepoint at {} does not follow the one at {}", pc_offset, last.pc_offset);
        }
        debug!(pc_offset, %oop_map, "safepoint");
        self.oop_maps.add_gc_map(pc_offset, oop_map);
        self.current = Some(PcDesc {
            pc_offset,
            leaf_graph_id,
            scopes: vec![],
            objects: ObjectPool::new(),
        });
    }

    pub fn describe_scope(&mut self, pc_offset: usize, scope: ScopeDesc) {
        let current = self.current_at(pc_offset);
        debug!(pc_offset, depth = current.scopes.len(), %scope, "scope");
        current.scopes.push(scope);
    }

    pub fn dump_object_pool(&mut self, pc_offset: usize, objects: ObjectPool) {
        let current = self.current_at(pc_offset);
        current.objects = objects;
    }

    pub fn end_safepoint(&mut self, pc_offset: usize) {
        self.current_at(pc_offset);
        if let Some(current) = self.current.take() {
            self.pcs.push(current);
        }
    }

    fn current_at(&mut self, pc_offset: usize) -> &mut PcDesc {
        match self.current.as_mut() {
            Some(current) => {
                guarantee!(current.pc_offset == pc_offset, "safepoint at {} is still open, not at {}", current.pc_offset, pc_offset);
                current
            }
            None => installer_common::fatal!("no safepoint open at {}", pc_offset)
        }
    }

    pub fn pc_desc_at(&self, pc_offset: usize) -> Option<&PcDesc> {
        self.pcs.iter().find(|pc_desc| pc_desc.pc_offset == pc_offset)
    }

    pub fn pcs(&self) -> &[PcDesc] {
        self.pcs.as_slice()
    }

    pub fn oop_maps(&self) -> &OopMapSet {
        &self.oop_maps
    }

    /// Finished tables. Fatal if a safepoint is still open.
    pub fn into_parts(self) -> (OopMapSet, Vec<PcDesc>) {
        guarantee!(self.current.is_none(), "safepoint left open");
        (self.oop_maps, self.pcs)
    }
}
