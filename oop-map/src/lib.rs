//! Reference maps: which registers and stack slots hold managed references at a safepoint.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use strum_macros::Display;

use installer_common::{fatal, guarantee};

use crate::registers::RegisterNumber;

pub mod decoder;
pub mod registers;

/// A register or a stack slot, as named by the collector. Stack slots count 4 byte units from
/// the stack pointer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VMReg {
    Register(RegisterNumber),
    Stack(u32),
}

impl VMReg {
    pub fn stack(slot: u32) -> Self {
        VMReg::Stack(slot)
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, VMReg::Stack(_))
    }
}

impl Display for VMReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VMReg::Register(register) => write!(f, "{}", register),
            VMReg::Stack(slot) => write!(f, "stack[{}]", slot),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
pub enum OopMapValue {
    #[strum(serialize = "oop")]
    Oop,
    #[strum(serialize = "value")]
    Value,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OopMap {
    frame_size: usize,
    parameter_count: usize,
    entries: BTreeMap<VMReg, OopMapValue>,
}

impl OopMap {
    pub fn new(frame_size: usize, parameter_count: usize) -> Self {
        Self {
            frame_size,
            parameter_count,
            entries: BTreeMap::new(),
        }
    }

    pub fn set_oop(&mut self, reg: VMReg) {
        self.set(reg, OopMapValue::Oop)
    }

    pub fn set_value(&mut self, reg: VMReg) {
        self.set(reg, OopMapValue::Value)
    }

    fn set(&mut self, reg: VMReg, value: OopMapValue) {
        if let Some(previous) = self.entries.insert(reg, value) {
            fatal!("{} already recorded as {} in oop map", reg, previous);
        }
    }

    pub fn get(&self, reg: VMReg) -> Option<OopMapValue> {
        self.entries.get(&reg).copied()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn entries(&self) -> impl Iterator<Item=(VMReg, OopMapValue)> + '_ {
        self.entries.iter().map(|(reg, value)| (*reg, *value))
    }

    pub fn oops(&self) -> impl Iterator<Item=VMReg> + '_ {
        self.entries().filter(|(_, value)| *value == OopMapValue::Oop).map(|(reg, _)| reg)
    }
}

impl Display for OopMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OopMap{{")?;
        for (i, reg) in self.oops().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", reg)?;
        }
        write!(f, "}}")
    }
}

/// Oop maps keyed by the pc offset of their safepoint.
#[derive(Clone, Debug, Default)]
pub struct OopMapSet {
    maps: BTreeMap<usize, OopMap>,
}

impl OopMapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_gc_map(&mut self, pc_offset: usize, map: OopMap) {
        guarantee!(!self.maps.contains_key(&pc_offset), "second oop map at pc offset {}", pc_offset);
        self.maps.insert(pc_offset, map);
    }

    pub fn find_map_at_offset(&self, pc_offset: usize) -> Option<&OopMap> {
        self.maps.get(&pc_offset)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=(usize, &OopMap)> {
        self.maps.iter().map(|(pc_offset, map)| (*pc_offset, map))
    }
}

#[cfg(test)]
mod tests {
    use crate::{OopMap, OopMapSet, OopMapValue, VMReg};
    use crate::registers::RegisterNumber;

    #[test]
    fn oops_are_listed_registers_first() {
        let mut map = OopMap::new(16, 0);
        map.set_oop(VMReg::stack(2));
        map.set_value(VMReg::stack(0));
        map.set_oop(VMReg::Register(RegisterNumber(3)));
        assert_eq!(map.oops().collect::<Vec<_>>(), vec![VMReg::Register(RegisterNumber(3)), VMReg::Stack(2)]);
        assert_eq!(map.get(VMReg::stack(0)), Some(OopMapValue::Value));
        assert_eq!(map.to_string(), "OopMap{rbx, stack[2]}");
    }

    #[test]
    #[should_panic(expected = "already recorded")]
    fn location_is_recorded_once() {
        let mut map = OopMap::new(16, 0);
        map.set_value(VMReg::stack(0));
        map.set_oop(VMReg::stack(0));
    }

    #[test]
    #[should_panic(expected = "second oop map")]
    fn one_map_per_pc() {
        let mut set = OopMapSet::new();
        set.add_gc_map(5, OopMap::new(16, 0));
        set.add_gc_map(5, OopMap::new(16, 0));
    }
}
