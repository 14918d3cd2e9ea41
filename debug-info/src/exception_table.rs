//! Exception handler and implicit exception tables.

use installer_common::guarantee;

/// One row of the handler table. A subtable starts with a header row whose `bci` is the number of
/// handler rows that follow and whose `pco` is the offset of the throwing instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HandlerTableEntry {
    pub bci: i32,
    pub pco: i32,
    pub scope_depth: i32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExceptionHandlerTable {
    entries: Vec<HandlerTableEntry>,
}

impl ExceptionHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subtable(&mut self, catch_pco: i32, handlers: &[HandlerTableEntry]) {
        guarantee!(!handlers.is_empty(), "empty handler subtable at {}", catch_pco);
        self.entries.push(HandlerTableEntry { bci: handlers.len() as i32, pco: catch_pco, scope_depth: 0 });
        self.entries.extend_from_slice(handlers);
    }

    pub fn entries(&self) -> &[HandlerTableEntry] {
        self.entries.as_slice()
    }

    /// Handler rows for the instruction at `catch_pco`.
    pub fn subtable_for(&self, catch_pco: i32) -> Option<&[HandlerTableEntry]> {
        let mut i = 0;
        while i < self.entries.len() {
            let header = self.entries[i];
            let len = header.bci as usize;
            if header.pco == catch_pco {
                return Some(&self.entries[i + 1..i + 1 + len]);
            }
            i += 1 + len;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps the offset of an instruction that may fault on null to the offset execution continues at.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImplicitExceptionTable {
    entries: Vec<(u32, u32)>,
}

impl ImplicitExceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, exec_offset: u32, continuation_offset: u32) {
        guarantee!(self.at(exec_offset).is_none(), "second implicit exception entry at {}", exec_offset);
        self.entries.push((exec_offset, continuation_offset));
    }

    pub fn at(&self, exec_offset: u32) -> Option<u32> {
        self.entries.iter().find(|(exec, _)| *exec == exec_offset).map(|(_, continuation)| *continuation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
