use pretty_assertions::assert_eq;

use crate::{CodeBuffer, CodeBufferError, CodeBufferLayout};
use crate::native_instruction::OperandLocation;
use crate::relocation::{OperandFormat, RelocationKind, SectionId};

fn layout() -> CodeBufferLayout {
    CodeBufferLayout {
        insts_size: 30,
        consts_size: 32,
        consts_alignment: 16,
        relocation_capacity: 2,
    }
}

#[test]
fn consts_section_starts_aligned_after_instruction_capacity() {
    let buffer = CodeBuffer::new(layout(), 0x1000);
    assert_eq!(buffer.consts_start(), 32);
    assert_eq!(buffer.consts_address(8), 0x1000 + 40);
    assert_eq!(buffer.insts_address(3), 0x1003);
}

#[test]
fn code_larger_than_section_is_recoverable() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    assert_eq!(buffer.copy_code(&[0x90; 31]), Err(CodeBufferError::InstructionsOverflow { size: 31, capacity: 30 }));
    assert!(buffer.copy_code(&[0x90; 30]).is_ok());
}

#[test]
fn constants_are_padded_to_alignment() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    assert_eq!(buffer.append_constant(&[1, 2, 3], 1), Ok(0));
    assert_eq!(buffer.append_constant(&7u64.to_le_bytes(), 8), Ok(8));
    assert_eq!(buffer.consts().size(), 16);
    assert_eq!(buffer.read_constant_u64(8), 7);
    assert_eq!(buffer.append_constant(&[0; 16], 16), Ok(16));
    assert_eq!(buffer.append_constant(&[0; 1], 1), Err(CodeBufferError::ConstantsOverflow { needed: 33, capacity: 32 }));
}

#[test]
#[should_panic(expected = "restricted by alignment of section begin")]
fn constant_alignment_beyond_section_alignment_is_fatal() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    let _ = buffer.append_constant(&[0; 8], 32);
}

#[test]
fn relocation_capacity_is_enforced() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    buffer.copy_code(&[0x90; 4]).unwrap();
    buffer.relocate(0, RelocationKind::Oop, OperandFormat::Imm).unwrap();
    buffer.relocate(1, RelocationKind::Metadata, OperandFormat::Imm).unwrap();
    assert_eq!(buffer.relocate(2, RelocationKind::Oop, OperandFormat::Imm), Err(CodeBufferError::RelocationsOverflow { capacity: 2 }));
    assert_eq!(buffer.relocations().len(), 2);
}

#[test]
fn relocation_kind_can_be_changed() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    buffer.copy_code(&[0x90; 4]).unwrap();
    buffer.relocate(2, RelocationKind::Oop, OperandFormat::Imm).unwrap();
    buffer.change_relocation_kind(2, RelocationKind::Oop, RelocationKind::None);
    assert_eq!(buffer.relocations()[0].kind, RelocationKind::None);
}

#[test]
fn operands_are_little_endian() {
    let mut buffer = CodeBuffer::new(layout(), 0);
    buffer.copy_code(&[0; 12]).unwrap();
    buffer.write_i32(OperandLocation { offset: 0, size: 4 }, -2);
    assert_eq!(&buffer.insts().bytes()[0..4], &[0xFE, 0xFF, 0xFF, 0xFF]);
    buffer.write_u64(OperandLocation { offset: 4, size: 8 }, 0x0102_0304_0506_0708);
    assert_eq!(buffer.read_u64(OperandLocation { offset: 4, size: 8 }), 0x0102_0304_0506_0708);
    assert_eq!(buffer.read_u8(4), 0x08);
}

#[test]
fn moving_keeps_absolute_call_targets_and_section_words() {
    let base = 0x1000;
    let mut buffer = CodeBuffer::new(layout(), base);
    // call rel32; movsd xmm0, [rip + disp32]
    buffer.copy_code(&[0xE8, 0, 0, 0, 0, 0xF2, 0x0F, 0x10, 0x05, 0, 0, 0, 0]).unwrap();
    let call = buffer.instruction_at(0);
    buffer.write_i32(call.branch_operand(), (0x9000 - (base + 5)) as i32);
    buffer.relocate(0, RelocationKind::RuntimeCall, OperandFormat::Call32).unwrap();
    let load = buffer.instruction_at(5);
    let disp = buffer.consts_address(0) - buffer.insts_address(load.next_instruction_offset());
    buffer.write_i32(load.disp32_operand(), disp as i32);
    buffer.relocate(5, RelocationKind::SectionWord { section: SectionId::Consts, target_offset: 0 }, OperandFormat::Disp32).unwrap();

    buffer.move_to(0x2000);

    assert_eq!(buffer.base(), 0x2000);
    assert_eq!(buffer.read_i32(OperandLocation { offset: 1, size: 4 }), 0x9000 - 0x2005);
    assert_eq!(buffer.read_i32(OperandLocation { offset: 9, size: 4 }), disp as i32);
}
