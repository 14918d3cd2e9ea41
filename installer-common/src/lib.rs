pub mod basic_type;
pub mod debug;
pub mod ids;
pub mod test_utils;

pub const HEAP_WORD_SIZE: usize = 8;
pub const BYTES_PER_LONG: usize = 8;
// VMReg stack units are 4 bytes
pub const STACK_SLOT_SIZE: usize = 4;

pub fn align_up(value: usize, alignment: usize) -> usize {
    assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
