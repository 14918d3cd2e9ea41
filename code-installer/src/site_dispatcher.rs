//! Applies the sites of a compilation result to the code buffer, in ascending offset order.
//!
//! The only state carried from one site to the next is the call type set by the last invoke mark,
//! which the following call consumes.

use tracing::trace;

use code_buffer::{CodeBuffer, CodeBufferError};
use code_buffer::code_offsets::{CodeOffsetKind, CodeOffsets};
use code_buffer::native_instruction::{NativeInstruction, pc_relative_displacement};
use code_buffer::relocation::{OperandFormat, RelocationKind, SectionId};
use compilation_result::{CallTarget, Constant, ConstantObject, DebugInfo, MarkId, Site, SiteKind};
use debug_info::DebugInformationRecorder;
use debug_info::exception_table::ImplicitExceptionTable;
use debug_info::oop_recorder::OopRecorder;
use installer_common::basic_type::BasicType;
use installer_common::ids::ObjectHandle;
use installer_common::{fatal, guarantee, should_not_reach_here};
use oop_map::decoder::{create_oop_map, ReferenceBits};
use oop_map::OopMap;

use crate::config::InstallerConfig;
use crate::runtime::VmRuntime;
use crate::scope_recorder::record_scopes;
use crate::value_translator::{record_metadata_in_constant, ValueTranslator};

/// `call r64` following a `mov r64, imm64`: REX prefix, `0xFF` opcode and ModRM byte.
const CALL_REG_SIZE: usize = 3;
const REX_PREFIX: u8 = 0x40;
const REX_B_PREFIX: u8 = 0x41;
const CALL_REG_OPCODE: u8 = 0xFF;
const PATCHING_BYTE_SKIP: u8 = 5;

/// The outputs of a dispatch pass besides the relocations in the buffer.
#[derive(Debug)]
pub struct DispatchedCode {
    pub buffer: CodeBuffer,
    pub debug_recorder: DebugInformationRecorder,
    pub oop_recorder: OopRecorder,
    pub code_offsets: CodeOffsets,
    pub implicit_exceptions: ImplicitExceptionTable,
}

pub struct SiteDispatcher<'vm> {
    runtime: &'vm dyn VmRuntime,
    config: &'vm InstallerConfig,
    total_frame_size: usize,
    parameter_count: usize,
    buffer: CodeBuffer,
    debug_recorder: DebugInformationRecorder,
    oop_recorder: OopRecorder,
    code_offsets: CodeOffsets,
    implicit_exceptions: ImplicitExceptionTable,
    next_call_type: MarkId,
    invoke_mark_offset: Option<usize>,
}

impl<'vm> SiteDispatcher<'vm> {
    /// `total_frame_size` is in bytes and includes the return address.
    pub fn new(runtime: &'vm dyn VmRuntime, config: &'vm InstallerConfig, buffer: CodeBuffer, total_frame_size: usize, parameter_count: usize) -> Self {
        Self {
            runtime,
            config,
            total_frame_size,
            parameter_count,
            buffer,
            debug_recorder: DebugInformationRecorder::new(),
            oop_recorder: OopRecorder::new(),
            code_offsets: CodeOffsets::new(),
            implicit_exceptions: ImplicitExceptionTable::new(),
            next_call_type: MarkId::InvokeInvalid,
            invoke_mark_offset: None,
        }
    }

    pub fn buffer(&self) -> &CodeBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut CodeBuffer {
        &mut self.buffer
    }

    pub fn dispatch_all<'l>(&mut self, sites: impl IntoIterator<Item=&'l Site>) -> Result<(), CodeBufferError> {
        for site in sites {
            self.dispatch(site)?;
        }
        Ok(())
    }

    pub fn dispatch(&mut self, site: &Site) -> Result<(), CodeBufferError> {
        let pc_offset = self.check_offset(site.pc_offset);
        trace!(pc_offset, kind = site.kind.name(), "site");
        match &site.kind {
            SiteKind::Call { target, debug_info } => self.site_call(pc_offset, target, debug_info.as_ref()),
            SiteKind::Safepoint { debug_info } => {
                self.site_safepoint(pc_offset, debug_info);
                Ok(())
            }
            SiteKind::DataPatch { constant, alignment, inlined } => self.site_data_patch(pc_offset, constant, *alignment, *inlined),
            SiteKind::Mark { id, references } => self.site_mark(pc_offset, *id, references.as_slice()),
        }
    }

    pub fn finish(self) -> DispatchedCode {
        DispatchedCode {
            buffer: self.buffer,
            debug_recorder: self.debug_recorder,
            oop_recorder: self.oop_recorder,
            code_offsets: self.code_offsets,
            implicit_exceptions: self.implicit_exceptions,
        }
    }

    fn check_offset(&self, offset: i32) -> usize {
        guarantee!(offset >= 0 && (offset as usize) < self.buffer.code_size(), "offset {} outside of code of size {}", offset, self.buffer.code_size());
        offset as usize
    }

    fn create_oop_map(&self, debug_info: &DebugInfo) -> OopMap {
        let register_map = debug_info.register_ref_map.as_ref().map(|map| map as &dyn ReferenceBits);
        create_oop_map(self.total_frame_size, self.parameter_count, register_map, &debug_info.frame_ref_map)
    }

    fn record_scopes(&mut self, pc_offset: usize, debug_info: &DebugInfo) {
        let translator = ValueTranslator::new(self.runtime, &mut self.oop_recorder, self.config.byte_order, self.total_frame_size as i32, &debug_info.virtual_objects);
        record_scopes(&mut self.debug_recorder, translator, pc_offset, debug_info);
    }

    fn open_safepoint(&mut self, pc_offset: usize, debug_info: &DebugInfo, leaf_graph_id: i64) {
        let oop_map = self.create_oop_map(debug_info);
        self.debug_recorder.add_safepoint(pc_offset, leaf_graph_id, oop_map);
        self.record_scopes(pc_offset, debug_info);
    }

    fn set_branch_destination(&mut self, instruction: &NativeInstruction, destination: u64) {
        let next_instruction = self.buffer.insts_address(instruction.next_instruction_offset());
        self.buffer.write_i32(instruction.branch_operand(), pc_relative_displacement(destination, next_instruction));
    }

    fn site_safepoint(&mut self, pc_offset: usize, debug_info: &DebugInfo) {
        self.open_safepoint(pc_offset, debug_info, -1);
        self.debug_recorder.end_safepoint(pc_offset);
    }

    fn site_call(&mut self, pc_offset: usize, target: &CallTarget, debug_info: Option<&DebugInfo>) -> Result<(), CodeBufferError> {
        let instruction = self.buffer.instruction_at(pc_offset);
        let next_pc_offset = if instruction.is_call() || instruction.is_jump() {
            instruction.next_instruction_offset()
        } else if instruction.is_mov_literal64() {
            let call_offset = instruction.next_instruction_offset();
            guarantee!(call_offset + CALL_REG_SIZE <= self.buffer.code_size(), "mov at {} is not followed by a call", pc_offset);
            let prefix = self.buffer.read_u8(call_offset);
            let opcode = self.buffer.read_u8(call_offset + 1);
            guarantee!((prefix == REX_PREFIX || prefix == REX_B_PREFIX) && opcode == CALL_REG_OPCODE, "expected call with rex/rexb prefix byte after mov at {}", pc_offset);
            call_offset + CALL_REG_SIZE
        } else if instruction.is_call_reg() {
            guarantee!(matches!(target, CallTarget::Method(_)), "call through register at {} is only valid for method calls", pc_offset);
            instruction.next_instruction_offset()
        } else {
            fatal!("unsupported type of instruction for call site at {}: {}", pc_offset, instruction.iced())
        };

        if let CallTarget::InstalledCode(id) = target {
            guarantee!(instruction.is_jump(), "jump expected at {} for a call to installed code", pc_offset);
            let entry = match self.runtime.method_table().read().verified_entry_point(*id) {
                Some(entry) => entry,
                None => fatal!("no installed code {:?}", id),
            };
            self.set_branch_destination(&instruction, entry);
            self.buffer.relocate(pc_offset, RelocationKind::RuntimeCall, OperandFormat::Call32)?;
            trace!(pc_offset, entry = format!("{:#x}", entry).as_str(), "jump to installed code");
            return Ok(());
        }

        if let Some(debug_info) = debug_info {
            self.open_safepoint(next_pc_offset, debug_info, debug_info.frame.leaf_graph_id);
        }

        match target {
            CallTarget::RuntimeStub(stub_id) => {
                let destination = match self.runtime.runtime_stub_address(*stub_id) {
                    Some(address) => address,
                    None => fatal!("unknown runtime stub {}", stub_id),
                };
                if instruction.is_mov_literal64() {
                    self.buffer.write_u64(instruction.imm64_operand(), destination);
                    self.buffer.relocate(pc_offset, RelocationKind::RuntimeCall, OperandFormat::Imm)?;
                } else {
                    self.set_branch_destination(&instruction, destination);
                    self.buffer.relocate(pc_offset, RelocationKind::RuntimeCall, OperandFormat::Call32)?;
                }
                trace!(pc_offset, stub_id, destination = format!("{:#x}", destination).as_str(), "runtime call");
            }
            CallTarget::Method(method) => {
                guarantee!(debug_info.is_some(), "debug info expected at method call {}", pc_offset);
                let method = method.resolved();
                match self.next_call_type {
                    MarkId::InlineInvokeVirtual => {}
                    MarkId::InvokeVirtual | MarkId::InvokeInterface => {
                        guarantee!(method.map_or(true, |method| !self.runtime.is_static(method)), "cannot call static method with invokeinterface or invokevirtual at {}", pc_offset);
                        let inline_cache_offset = match self.invoke_mark_offset {
                            Some(offset) => offset,
                            None => should_not_reach_here!("virtual call at {} without inline cache", pc_offset),
                        };
                        self.bind_call(&instruction, self.runtime.resolve_virtual_call_stub(), RelocationKind::VirtualCall { inline_cache_offset })?;
                    }
                    MarkId::InvokeStatic => {
                        guarantee!(method.map_or(true, |method| self.runtime.is_static(method)), "cannot call non-static method with invokestatic at {}", pc_offset);
                        self.bind_call(&instruction, self.runtime.resolve_static_call_stub(), RelocationKind::StaticCall)?;
                    }
                    MarkId::InvokeSpecial => {
                        guarantee!(method.map_or(true, |method| !self.runtime.is_static(method)), "cannot call static method with invokespecial at {}", pc_offset);
                        self.bind_call(&instruction, self.runtime.resolve_opt_virtual_call_stub(), RelocationKind::OptVirtualCall)?;
                    }
                    MarkId::InvokeInvalid => fatal!("invalid next call type for call at {}", pc_offset),
                    other => should_not_reach_here!("{:?} is not a call type", other),
                }
            }
            CallTarget::InstalledCode(_) => should_not_reach_here!(),
        }

        self.next_call_type = MarkId::InvokeInvalid;
        if debug_info.is_some() {
            self.debug_recorder.end_safepoint(next_pc_offset);
        }
        Ok(())
    }

    fn bind_call(&mut self, instruction: &NativeInstruction, destination: u64, kind: RelocationKind) -> Result<(), CodeBufferError> {
        guarantee!(instruction.is_call(), "direct call expected at {} for {}", instruction.offset, kind);
        self.set_branch_destination(instruction, destination);
        trace!(pc_offset = instruction.offset, %kind, destination = format!("{:#x}", destination).as_str(), "method call");
        self.buffer.relocate(instruction.offset, kind, OperandFormat::Call32)
    }

    fn site_data_patch(&mut self, pc_offset: usize, constant: &Constant, alignment: usize, inlined: bool) -> Result<(), CodeBufferError> {
        let instruction = self.buffer.instruction_at(pc_offset);
        match constant.kind {
            BasicType::Boolean | BasicType::Byte | BasicType::Short | BasicType::Char | BasicType::Int => {
                fatal!("int-sized values not expected in DataPatch at {}", pc_offset)
            }
            BasicType::Float | BasicType::Long | BasicType::Double | BasicType::Word => {
                record_metadata_in_constant(constant, &mut self.oop_recorder);
                if inlined {
                    self.buffer.write_u64(instruction.imm64_operand(), constant.primitive as u64);
                    trace!(pc_offset, bits = format!("{:#x}", constant.primitive).as_str(), "inlined constant");
                } else {
                    guarantee!(instruction.is_ip_relative(), "constant load at {} is not rip-relative", pc_offset);
                    let operand = instruction.disp32_operand();
                    let section_offset = self.buffer.append_constant(&constant.primitive.to_le_bytes(), alignment)?;
                    let destination = self.buffer.consts_address(section_offset);
                    let next_instruction = self.buffer.insts_address(instruction.next_instruction_offset());
                    self.buffer.write_i32(operand, pc_relative_displacement(destination, next_instruction));
                    self.buffer.relocate(pc_offset, RelocationKind::SectionWord { section: SectionId::Consts, target_offset: section_offset }, OperandFormat::Disp32)?;
                    trace!(pc_offset, section_offset, alignment, "constant in constants section");
                }
            }
            BasicType::Object => {
                let handle = match &constant.object {
                    None => ObjectHandle(0),
                    Some(ConstantObject::Heap(address)) => {
                        let handle = self.runtime.make_local(*address);
                        self.oop_recorder.find_oop_index(handle);
                        handle
                    }
                    Some(other) => fatal!("unexpected object constant {:?} at {}", other, pc_offset),
                };
                self.buffer.write_u64(instruction.imm64_operand(), handle.0);
                self.buffer.relocate(pc_offset, RelocationKind::Oop, OperandFormat::Imm)?;
            }
            BasicType::Illegal => fatal!("unexpected constant kind {} at {}", constant.kind, pc_offset),
        }
        Ok(())
    }

    fn site_mark(&mut self, pc_offset: usize, id: i32, references: &[i32]) -> Result<(), CodeBufferError> {
        let mark = match MarkId::from_raw(id) {
            Some(mark) => mark,
            None => fatal!("invalid mark id: {:#x}", id),
        };
        trace!(pc_offset, ?mark, "mark");
        match mark {
            MarkId::UnverifiedEntry => self.code_offsets.set_value(CodeOffsetKind::Entry, pc_offset),
            MarkId::VerifiedEntry => self.code_offsets.set_value(CodeOffsetKind::VerifiedEntry, pc_offset),
            MarkId::OsrEntry => self.code_offsets.set_value(CodeOffsetKind::OsrEntry, pc_offset),
            MarkId::UnwindEntry => self.code_offsets.set_value(CodeOffsetKind::UnwindHandler, pc_offset),
            MarkId::ExceptionHandlerEntry => self.code_offsets.set_value(CodeOffsetKind::Exceptions, pc_offset),
            MarkId::DeoptHandlerEntry => self.code_offsets.set_value(CodeOffsetKind::Deopt, pc_offset),
            MarkId::StaticCallStub => {
                guarantee!(references.len() == 1, "static call stub at {} needs exactly one call reference, got {}", pc_offset, references.len());
                let call_offset = self.check_offset(references[0]);
                self.buffer.relocate(pc_offset, RelocationKind::Metadata, OperandFormat::Imm)?;
                self.buffer.relocate(pc_offset, RelocationKind::StaticStub { call_offset }, OperandFormat::None)?;
            }
            MarkId::InvokeVirtual | MarkId::InvokeInterface => {
                // the inline cache starts out holding a value no type can have
                let instruction = self.buffer.instruction_at(pc_offset);
                guarantee!(instruction.is_mov_literal64(), "inline cache mov expected at {}", pc_offset);
                let operand = instruction.imm64_operand();
                guarantee!(self.buffer.read_u64(operand) == 0, "inline cache Klass* initial value should be 0L at {}", pc_offset);
                self.buffer.write_u64(operand, self.runtime.non_oop_word());
                self.set_next_call_type(mark, pc_offset);
            }
            MarkId::InlineInvokeVirtual | MarkId::InvokeInvalid | MarkId::InvokeSpecial | MarkId::InvokeStatic => {
                self.set_next_call_type(mark, pc_offset);
            }
            MarkId::ImplicitNull => {
                self.implicit_exceptions.append(pc_offset as u32, pc_offset as u32);
            }
            MarkId::PollNear | MarkId::PollReturnNear => {
                let instruction = self.buffer.instruction_at(pc_offset);
                guarantee!(instruction.is_ip_relative(), "poll at {} is not rip-relative", pc_offset);
                let operand = instruction.disp32_operand();
                let page_size = self.runtime.vm_page_size();
                guarantee!(page_size > 0, "vm page size must not be 0");
                let destination = self.runtime.polling_page() + (self.config.safepoint_poll_offset % page_size) as u64;
                let next_instruction = self.buffer.insts_address(instruction.next_instruction_offset());
                self.buffer.write_i32(operand, pc_relative_displacement(destination, next_instruction));
                let kind = if mark == MarkId::PollNear { RelocationKind::Poll } else { RelocationKind::PollReturn };
                self.buffer.relocate(pc_offset, kind, OperandFormat::Disp32)?;
            }
            MarkId::PollFar => self.buffer.relocate(pc_offset, RelocationKind::Poll, OperandFormat::None)?,
            MarkId::PollReturnFar => self.buffer.relocate(pc_offset, RelocationKind::PollReturn, OperandFormat::None)?,
            MarkId::KlassPatching | MarkId::AccessFieldPatching => {
                guarantee!(pc_offset >= 3, "patching mark at {} needs three header bytes", pc_offset);
                guarantee!(references.len() == 2, "patching mark at {} needs two references, got {}", pc_offset, references.len());
                let byte_skip = self.buffer.read_u8(pc_offset - 2);
                guarantee!(byte_skip == PATCHING_BYTE_SKIP, "unexpected byte_skip {} at {}", byte_skip, pc_offset);
                let first = self.check_offset(references[0]);
                let second = self.check_offset(references[1]);
                let byte_count = second as i64 - first as i64;
                guarantee!((0..=u8::MAX as i64).contains(&byte_count), "invalid patching byte count {} at {}", byte_count, pc_offset);
                let being_initialized_entry_offset = byte_count + byte_skip as i64;
                guarantee!(being_initialized_entry_offset <= u8::MAX as i64, "invalid being initialized entry offset {} at {}", being_initialized_entry_offset, pc_offset);
                self.buffer.write_u8(pc_offset - 1, byte_count as u8);
                self.buffer.write_u8(pc_offset - 3, being_initialized_entry_offset as u8);
                if mark == MarkId::AccessFieldPatching {
                    let instruction = self.buffer.instruction_at(first);
                    let operand = instruction.disp32_operand();
                    guarantee!(self.buffer.read_i32(operand) == i32::MAX, "unexpected field offset placeholder at {}", first);
                    self.buffer.write_i32(operand, 0);
                }
            }
            MarkId::DummyOopRelocation => {
                self.buffer.relocate(pc_offset, RelocationKind::Oop, OperandFormat::Imm)?;
                self.buffer.change_relocation_kind(pc_offset, RelocationKind::Oop, RelocationKind::None);
            }
        }
        Ok(())
    }

    fn set_next_call_type(&mut self, mark: MarkId, pc_offset: usize) {
        self.next_call_type = mark;
        self.invoke_mark_offset = Some(pc_offset);
    }
}
