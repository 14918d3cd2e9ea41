use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identity of a runtime method, the address of its metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MethodId(pub u64);

/// Identity of a runtime type, the address of its metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct KlassId(pub u64);

/// Raw address of a heap object. Only meaningful while collection is disabled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectAddress(pub u64);

/// A tracked reference to a heap object handed out by the runtime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

/// Index of a unit in the method table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstalledCodeId(pub usize);

/// Metadata that installed code may embed and that the runtime may need to patch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Metadata {
    Klass(KlassId),
    Method(MethodId),
}

impl Metadata {
    pub fn address(&self) -> u64 {
        match self {
            Metadata::Klass(klass) => klass.0,
            Metadata::Method(method) => method.0,
        }
    }
}

impl Display for MethodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "method@{:#x}", self.0)
    }
}

impl Display for KlassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "klass@{:#x}", self.0)
    }
}
