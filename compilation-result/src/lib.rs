//! The compiler's description of one compiled unit, as handed to the installer.
//!
//! Everything here is produced by the compiler and treated as immutable input. The vocabulary of
//! sites, values, marks and assumptions is closed and versioned together with the installer.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use installer_common::ids::{InstalledCodeId, MethodId};

pub use crate::assumptions::Assumption;
pub use crate::debug_info::{BitMap, BytecodeFrame, DebugInfo, AFTER_BCI, BEFORE_BCI};
pub use crate::marks::MarkId;
pub use crate::value::{Constant, ConstantObject, StackLock, Value, VirtualObject};

pub mod assumptions;
pub mod debug_info;
pub mod marks;
pub mod value;

pub const INVOCATION_ENTRY_BCI: i32 = -1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompilationResult {
    pub name: String,
    /// `None` when installing a runtime stub rather than a method.
    pub method: Option<MethodId>,
    #[serde(default = "default_entry_bci")]
    pub entry_bci: i32,
    pub target_code: Vec<u8>,
    /// Number of meaningful bytes at the start of `target_code`.
    pub target_code_size: usize,
    /// Excludes the return address.
    pub frame_size: i32,
    #[serde(default)]
    pub parameter_count: u32,
    #[serde(default = "default_custom_stack_area_offset")]
    pub custom_stack_area_offset: i32,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub exception_handlers: Vec<ExceptionHandler>,
    #[serde(default)]
    pub assumptions: Vec<Assumption>,
    #[serde(default)]
    pub data_section: Option<DataSection>,
}

fn default_entry_bci() -> i32 {
    INVOCATION_ENTRY_BCI
}

fn default_custom_stack_area_offset() -> i32 {
    -1
}

impl CompilationResult {
    pub fn is_osr(&self) -> bool {
        self.entry_bci != INVOCATION_ENTRY_BCI
    }

    /// Sites in ascending offset order. Sites sharing an offset keep their relative order, so a
    /// call-kind mark stays in front of the call it describes.
    pub fn sites_in_offset_order(&self) -> Vec<&Site> {
        self.sites.iter().sorted_by_key(|site| site.pc_offset).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    pub pc_offset: i32,
    pub kind: SiteKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SiteKind {
    Call {
        target: CallTarget,
        debug_info: Option<DebugInfo>,
    },
    Safepoint {
        debug_info: DebugInfo,
    },
    DataPatch {
        constant: Constant,
        alignment: usize,
        inlined: bool,
    },
    Mark {
        id: i32,
        /// Code offsets of the sites this mark refers back to.
        #[serde(default)]
        references: Vec<i32>,
    },
}

impl SiteKind {
    pub fn name(&self) -> &'static str {
        match self {
            SiteKind::Call { .. } => "call",
            SiteKind::Safepoint { .. } => "safepoint",
            SiteKind::DataPatch { .. } => "datapatch",
            SiteKind::Mark { .. } => "mark",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CallTarget {
    Method(JavaMethodRef),
    /// Opaque id of a runtime stub, resolved through the runtime's stub table.
    RuntimeStub(i64),
    /// Code the runtime already installed; calls to it are bound directly to its verified entry.
    InstalledCode(InstalledCodeId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JavaMethodRef {
    Resolved(MethodId),
    Unresolved {
        holder: String,
        name: String,
        signature: String,
    },
}

impl JavaMethodRef {
    pub fn resolved(&self) -> Option<MethodId> {
        match self {
            JavaMethodRef::Resolved(method) => Some(*method),
            JavaMethodRef::Unresolved { .. } => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub pc_offset: i32,
    pub handler_pos: i32,
}

/// Constants the compiler already laid out, copied to the start of the constants section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSection {
    pub data: Vec<u8>,
    pub alignment: usize,
}

#[cfg(test)]
mod tests;
