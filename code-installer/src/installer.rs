//! Entry points: turn a [`CompilationResult`] into code registered in the runtime's method table.

use thiserror::Error;
use tracing::{debug, info};

use code_buffer::{CodeBuffer, CodeBufferError, CodeBufferLayout};
use compilation_result::CompilationResult;
use debug_info::exception_table::{ExceptionHandlerTable, HandlerTableEntry};
use dependencies::{Dependencies, DependencyViolation};
use installer_common::ids::{InstalledCodeId, ObjectHandle};
use installer_common::{fatal, guarantee, should_not_reach_here, HEAP_WORD_SIZE};
use method_table::{CodeCacheFull, NewCode};

use crate::assumptions::record_assumptions;
use crate::config::InstallerConfig;
use crate::runtime::{NoSafepointScope, VmRuntime};
use crate::site_dispatcher::{DispatchedCode, SiteDispatcher};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum InstallError {
    #[error(transparent)]
    CodeBuffer(#[from] CodeBufferError),
}

#[derive(Debug, Eq, PartialEq)]
pub enum CodeInstallResult {
    Ok(InstalledCodeId),
    DependenciesFailed(DependencyViolation),
    CacheFull(CodeCacheFull),
}

#[derive(Debug, Eq, PartialEq)]
pub enum StubInstallResult {
    /// `stub_id` is what compiled code uses to call the stub.
    Ok { id: InstalledCodeId, stub_id: i64 },
    CacheFull(CodeCacheFull),
}

pub struct CodeInstaller<'vm> {
    runtime: &'vm dyn VmRuntime,
    config: InstallerConfig,
}

impl<'vm> CodeInstaller<'vm> {
    pub fn new(runtime: &'vm dyn VmRuntime, config: InstallerConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn install_method(&self, result: &CompilationResult) -> Result<CodeInstallResult, InstallError> {
        let method = match result.method {
            Some(method) => method,
            None => fatal!("{} has no method to install code for", result.name),
        };
        info!(name = result.name.as_str(), %method, entry_bci = result.entry_bci, "installing method");
        let dependencies = record_assumptions(self.runtime, result.assumptions.as_slice());
        let parameter_count = self.runtime.size_of_parameters(method) as usize;
        let new_code = {
            let _no_safepoint = NoSafepointScope::enter(self.runtime);
            self.assemble(result, parameter_count, dependencies)?
        };
        Ok(self.commit(new_code))
    }

    /// Installs code that is not a method, such as a runtime stub, and makes it callable by stub id.
    pub fn install_stub(&self, result: &CompilationResult) -> Result<StubInstallResult, InstallError> {
        guarantee!(result.method.is_none(), "stub {} must not have a method", result.name);
        guarantee!(result.assumptions.is_empty(), "stub {} must not make assumptions", result.name);
        info!(name = result.name.as_str(), "installing stub");
        let new_code = {
            let _no_safepoint = NoSafepointScope::enter(self.runtime);
            self.assemble(result, result.parameter_count as usize, Dependencies::new())?
        };
        match self.commit(new_code) {
            CodeInstallResult::Ok(id) => {
                let address = match self.runtime.method_table().read().try_lookup(id) {
                    Some(code) => code.address(),
                    None => should_not_reach_here!("stub {:?} vanished", id),
                };
                let stub_id = self.runtime.stub_table().write().add_stub(address);
                debug!(stub_id, address = format!("{:#x}", address).as_str(), "stub registered");
                Ok(StubInstallResult::Ok { id, stub_id })
            }
            CodeInstallResult::CacheFull(full) => Ok(StubInstallResult::CacheFull(full)),
            CodeInstallResult::DependenciesFailed(violation) => should_not_reach_here!("stub without dependencies failed {}", violation),
        }
    }

    fn buffer_layout(&self, result: &CompilationResult) -> CodeBufferLayout {
        let (data_size, data_alignment) = match result.data_section.as_ref() {
            Some(data_section) => (data_section.data.len(), data_section.alignment),
            None => (0, 0),
        };
        CodeBufferLayout {
            insts_size: result.target_code_size,
            consts_size: data_size + result.sites.len() * self.config.constant_bytes_per_site,
            consts_alignment: self.config.constants_alignment.max(data_alignment),
            relocation_capacity: result.sites.len() * self.config.relocations_per_site,
        }
    }

    /// Runs with collection disabled: object addresses in `result` are raw.
    fn assemble(&self, result: &CompilationResult, parameter_count: usize, dependencies: Dependencies) -> Result<NewCode, InstallError> {
        guarantee!(result.target_code_size <= result.target_code.len(), "target code size {} exceeds the {} code bytes", result.target_code_size, result.target_code.len());
        guarantee!(result.frame_size >= 0, "negative frame size {}", result.frame_size);
        guarantee!(!self.runtime.is_safepoint_allowed(), "installing {} while safepoints are allowed", result.name);
        let total_frame_size = result.frame_size as usize + HEAP_WORD_SIZE;

        // assembled where the code cache starts, so pc-relative calls into the runtime reach
        let mut buffer = CodeBuffer::new(self.buffer_layout(result), self.config.code_cache_base);
        buffer.copy_code(&result.target_code[..result.target_code_size])?;
        if let Some(data_section) = result.data_section.as_ref() {
            buffer.append_constant(data_section.data.as_slice(), data_section.alignment)?;
        }

        let mut dispatcher = SiteDispatcher::new(self.runtime, &self.config, buffer, total_frame_size, parameter_count);
        if let Err(err) = dispatcher.dispatch_all(result.sites_in_offset_order()) {
            self.release_locals(dispatcher.finish().oop_recorder.oops());
            return Err(err.into());
        }
        let DispatchedCode { buffer, debug_recorder, oop_recorder, code_offsets, implicit_exceptions } = dispatcher.finish();
        let exception_handlers = exception_handler_table(result, buffer.code_size());
        let (oop_maps, pcs) = debug_recorder.into_parts();

        Ok(NewCode {
            name: result.name.clone(),
            method: result.method,
            entry_bci: result.entry_bci,
            code: buffer,
            code_offsets,
            total_frame_size,
            custom_stack_area_offset: result.custom_stack_area_offset,
            oop_maps,
            pcs,
            exception_handlers,
            implicit_exceptions,
            dependencies,
            metadata: oop_recorder.metadata().to_vec(),
            oops: oop_recorder.oops().to_vec(),
        })
    }

    /// Dependencies are checked under the method table lock, so nothing can be registered between
    /// the check and the registration.
    fn commit(&self, new_code: NewCode) -> CodeInstallResult {
        let mut method_table = self.runtime.method_table().write();
        if let Err(violation) = new_code.dependencies.validate(self.runtime) {
            info!(name = new_code.name.as_str(), %violation, "dependencies failed");
            self.release_locals(&new_code.oops);
            return CodeInstallResult::DependenciesFailed(violation);
        }
        let handles = new_code.oops.clone();
        match method_table.register(new_code) {
            Ok(id) => CodeInstallResult::Ok(id),
            Err(full) => {
                info!(%full, "not installed");
                self.release_locals(&handles);
                CodeInstallResult::CacheFull(full)
            }
        }
    }

    fn release_locals(&self, handles: &[ObjectHandle]) {
        for handle in handles {
            self.runtime.release_local(*handle);
        }
        debug!(count = handles.len(), "released handles of uninstalled code");
    }
}

/// One subtable per throwing instruction, each with its single handler.
fn exception_handler_table(result: &CompilationResult, code_size: usize) -> ExceptionHandlerTable {
    let mut table = ExceptionHandlerTable::new();
    for handler in result.exception_handlers.iter() {
        guarantee!(handler.pc_offset >= 0 && (handler.pc_offset as usize) < code_size, "exception handler site {} outside of code", handler.pc_offset);
        guarantee!(handler.handler_pos >= 0 && (handler.handler_pos as usize) < code_size, "exception handler {} outside of code", handler.handler_pos);
        table.add_subtable(handler.pc_offset, &[HandlerTableEntry { bci: -1, pco: handler.handler_pos, scope_depth: 0 }]);
    }
    table
}
