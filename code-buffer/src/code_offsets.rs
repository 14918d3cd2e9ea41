use std::collections::BTreeMap;

use strum_macros::Display;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
pub enum CodeOffsetKind {
    Entry,
    VerifiedEntry,
    OsrEntry,
    Exceptions,
    Deopt,
    UnwindHandler,
}

/// Entry points and handler offsets within the instruction section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CodeOffsets {
    values: BTreeMap<CodeOffsetKind, usize>,
}

impl CodeOffsets {
    pub fn new() -> Self {
        Self { values: BTreeMap::new() }
    }

    pub fn set_value(&mut self, kind: CodeOffsetKind, offset: usize) {
        self.values.insert(kind, offset);
    }

    pub fn value(&self, kind: CodeOffsetKind) -> Option<usize> {
        self.values.get(&kind).copied()
    }

    /// Falls back to the unverified entry, then to the start of the code.
    pub fn verified_entry(&self) -> usize {
        self.value(CodeOffsetKind::VerifiedEntry)
            .or_else(|| self.value(CodeOffsetKind::Entry))
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item=(CodeOffsetKind, usize)> + '_ {
        self.values.iter().map(|(kind, offset)| (*kind, *offset))
    }
}
