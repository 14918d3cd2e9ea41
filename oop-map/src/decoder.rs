use tracing::trace;

use compilation_result::debug_info::BitMap;
use installer_common::{fatal, HEAP_WORD_SIZE, STACK_SLOT_SIZE};

use crate::{OopMap, VMReg};
use crate::registers::{CPU_REGISTER_COUNT, REGISTER_COUNT, RegisterNumber};

/// A bit per register or per stack word, set when it holds a reference.
pub trait ReferenceBits {
    fn is_set(&self, index: usize) -> bool;
    fn size(&self) -> usize;
}

impl ReferenceBits for BitMap {
    fn is_set(&self, index: usize) -> bool {
        BitMap::is_set(self, index)
    }

    fn size(&self) -> usize {
        BitMap::size(self)
    }
}

/// Builds the oop map of one safepoint.
///
/// `total_frame_size` is in bytes and includes the return address. Bit `i` of `frame_map`
/// covers the heap word at `i * HEAP_WORD_SIZE` from the stack pointer.
pub fn create_oop_map(total_frame_size: usize, parameter_count: usize, register_map: Option<&dyn ReferenceBits>, frame_map: &dyn ReferenceBits) -> OopMap {
    let mut map = OopMap::new(total_frame_size, parameter_count);
    if let Some(register_map) = register_map {
        for i in 0..register_map.size().min(REGISTER_COUNT as usize) {
            let register = RegisterNumber(i as u8);
            if register_map.is_set(i) && !register.can_hold_oop() {
                fatal!("reference bit set on register {} which cannot hold a reference", register);
            }
        }
    }
    for i in 0..CPU_REGISTER_COUNT {
        let register = RegisterNumber(i);
        let is_oop = register_map.map(|bits| (i as usize) < bits.size() && bits.is_set(i as usize)).unwrap_or(false);
        if is_oop {
            map.set_oop(VMReg::Register(register));
        } else {
            map.set_value(VMReg::Register(register));
        }
    }

    let units_per_word = HEAP_WORD_SIZE / STACK_SLOT_SIZE;
    let frame_words = total_frame_size / HEAP_WORD_SIZE;
    for i in 0..frame_map.size() {
        let is_oop = frame_map.is_set(i);
        if i >= frame_words {
            if is_oop {
                fatal!("reference bit {} is outside of the {} byte frame", i, total_frame_size);
            }
            continue;
        }
        let reg = VMReg::stack((i * units_per_word) as u32);
        if is_oop {
            trace!(%reg, "stack oop");
            map.set_oop(reg);
        } else {
            map.set_value(reg);
        }
    }
    map
}
