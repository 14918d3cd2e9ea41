//! The output region of one installation: instructions, constants and relocation records.
//!
//! The buffer is laid out as a single blob. Instructions start at blob offset 0 and the constants
//! section starts at the instruction capacity rounded up to the constants alignment, so
//! displacements between the two are invariant when the blob moves as a whole. Calls into the
//! runtime are pc-relative to absolute addresses and are fixed up by [`CodeBuffer::move_to`].

use thiserror::Error;
use tracing::trace;

use installer_common::{align_up, guarantee};

use crate::native_instruction::{NativeInstruction, OperandLocation, pc_relative_displacement};
use crate::relocation::{OperandFormat, Relocation, RelocationKind};

pub mod code_offsets;
pub mod native_instruction;
pub mod relocation;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CodeBufferError {
    #[error("{size} bytes of code do not fit the {capacity} byte instruction section")]
    InstructionsOverflow { size: usize, capacity: usize },
    #[error("constants section full: need {needed} bytes, capacity is {capacity}")]
    ConstantsOverflow { needed: usize, capacity: usize },
    #[error("relocation section full after {capacity} records")]
    RelocationsOverflow { capacity: usize },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CodeBufferLayout {
    pub insts_size: usize,
    pub consts_size: usize,
    pub consts_alignment: usize,
    pub relocation_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct CodeSection {
    bytes: Vec<u8>,
    capacity: usize,
    alignment: usize,
}

impl CodeSection {
    fn new(capacity: usize, alignment: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            alignment,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }
}

#[derive(Clone, Debug)]
pub struct CodeBuffer {
    insts: CodeSection,
    consts: CodeSection,
    relocations: Vec<Relocation>,
    relocation_capacity: usize,
    base: u64,
}

impl CodeBuffer {
    /// `base` is the address the instruction section is currently assembled at.
    pub fn new(layout: CodeBufferLayout, base: u64) -> Self {
        Self {
            insts: CodeSection::new(layout.insts_size, 1),
            consts: CodeSection::new(layout.consts_size, layout.consts_alignment),
            relocations: Vec::with_capacity(layout.relocation_capacity),
            relocation_capacity: layout.relocation_capacity,
            base,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn insts(&self) -> &CodeSection {
        &self.insts
    }

    pub fn consts(&self) -> &CodeSection {
        &self.consts
    }

    pub fn relocations(&self) -> &[Relocation] {
        self.relocations.as_slice()
    }

    pub fn copy_code(&mut self, code: &[u8]) -> Result<(), CodeBufferError> {
        let size = self.insts.bytes.len() + code.len();
        if size > self.insts.capacity {
            return Err(CodeBufferError::InstructionsOverflow { size, capacity: self.insts.capacity });
        }
        self.insts.bytes.extend_from_slice(code);
        Ok(())
    }

    pub fn code_size(&self) -> usize {
        self.insts.size()
    }

    /// Blob offset of the constants section.
    pub fn consts_start(&self) -> usize {
        align_up(self.insts.capacity, self.consts.alignment)
    }

    pub fn blob_size(&self) -> usize {
        self.consts_start() + self.consts.size()
    }

    pub fn insts_address(&self, offset: usize) -> u64 {
        self.base + offset as u64
    }

    pub fn consts_address(&self, offset: usize) -> u64 {
        self.base + (self.consts_start() + offset) as u64
    }

    pub fn instruction_at(&self, offset: usize) -> NativeInstruction {
        NativeInstruction::at(self.insts.bytes(), offset, self.base)
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        self.check_code_range(offset, 1);
        self.insts.bytes[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.check_code_range(offset, 1);
        self.insts.bytes[offset] = value;
    }

    pub fn read_i32(&self, operand: OperandLocation) -> i32 {
        guarantee!(operand.size == 4, "operand at {} is {} bytes, not 4", operand.offset, operand.size);
        self.check_code_range(operand.offset, 4);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.insts.bytes[operand.offset..operand.offset + 4]);
        i32::from_le_bytes(bytes)
    }

    pub fn write_i32(&mut self, operand: OperandLocation, value: i32) {
        guarantee!(operand.size == 4, "operand at {} is {} bytes, not 4", operand.offset, operand.size);
        self.check_code_range(operand.offset, 4);
        self.insts.bytes[operand.offset..operand.offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_u64(&self, operand: OperandLocation) -> u64 {
        guarantee!(operand.size == 8, "operand at {} is {} bytes, not 8", operand.offset, operand.size);
        self.check_code_range(operand.offset, 8);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.insts.bytes[operand.offset..operand.offset + 8]);
        u64::from_le_bytes(bytes)
    }

    pub fn write_u64(&mut self, operand: OperandLocation, value: u64) {
        guarantee!(operand.size == 8, "operand at {} is {} bytes, not 8", operand.offset, operand.size);
        self.check_code_range(operand.offset, 8);
        self.insts.bytes[operand.offset..operand.offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_constant_u64(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.consts.bytes[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    /// Appends `data` to the constants section at `alignment` and returns its section offset.
    pub fn append_constant(&mut self, data: &[u8], alignment: usize) -> Result<usize, CodeBufferError> {
        let mut offset = self.consts.size();
        if alignment > 0 {
            guarantee!(alignment <= self.consts.alignment, "alignment {} inside constants section is restricted by alignment of section begin ({})", alignment, self.consts.alignment);
            offset = align_up(offset, alignment);
        }
        let needed = offset + data.len();
        if needed > self.consts.capacity {
            return Err(CodeBufferError::ConstantsOverflow { needed, capacity: self.consts.capacity });
        }
        self.consts.bytes.resize(offset, 0);
        self.consts.bytes.extend_from_slice(data);
        Ok(offset)
    }

    pub fn relocate(&mut self, offset: usize, kind: RelocationKind, format: OperandFormat) -> Result<(), CodeBufferError> {
        guarantee!(offset < self.code_size(), "relocation at {} outside of code of size {}", offset, self.code_size());
        if self.relocations.len() >= self.relocation_capacity {
            return Err(CodeBufferError::RelocationsOverflow { capacity: self.relocation_capacity });
        }
        trace!(offset, %kind, %format, "relocation");
        self.relocations.push(Relocation { offset, kind, format });
        Ok(())
    }

    /// Rewrites the kind of the relocation of kind `from` recorded at `offset`.
    pub fn change_relocation_kind(&mut self, offset: usize, from: RelocationKind, to: RelocationKind) {
        match self.relocations.iter_mut().rev().find(|relocation| relocation.offset == offset && relocation.kind == from) {
            Some(relocation) => {
                relocation.kind = to;
            }
            None => {
                installer_common::fatal!("no {} relocation at {}", from, offset);
            }
        }
    }

    /// Moves the blob to `new_base`, re-resolving pc-relative references to absolute addresses.
    pub fn move_to(&mut self, new_base: u64) {
        let old_base = self.base;
        for relocation in self.relocations.clone() {
            let absolute = match (relocation.kind, relocation.format) {
                (kind, OperandFormat::Call32) => kind.is_call(),
                (RelocationKind::Poll | RelocationKind::PollReturn, OperandFormat::Disp32) => true,
                _ => false
            };
            if !absolute {
                continue;
            }
            let instruction = self.instruction_at(relocation.offset);
            let operand = match relocation.format {
                OperandFormat::Call32 => instruction.branch_operand(),
                _ => instruction.disp32_operand(),
            };
            let next_instruction = instruction.next_instruction_offset();
            let old_disp = self.read_i32(operand);
            let target = (old_base + next_instruction as u64).wrapping_add(old_disp as i64 as u64);
            let new_disp = pc_relative_displacement(target, new_base + next_instruction as u64);
            self.write_i32(operand, new_disp);
        }
        self.base = new_base;
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>, Vec<Relocation>, u64) {
        (self.insts.bytes, self.consts.bytes, self.relocations, self.base)
    }

    fn check_code_range(&self, offset: usize, size: usize) {
        guarantee!(offset + size <= self.insts.size(), "access of {} bytes at {} outside of code of size {}", size, offset, self.insts.size());
    }
}

#[cfg(test)]
mod tests;
