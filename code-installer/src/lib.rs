//! Installs code produced by an optimizing compiler into a managed runtime.
//!
//! An installation copies the machine code into a [`code_buffer::CodeBuffer`], applies every site
//! of the compilation result (calls, safepoints, data patches and marks), records the debug
//! information deoptimization and the collector need, and registers the result in the runtime's
//! method table.

pub use crate::config::{ByteOrder, ConfigError, InstallerConfig};
pub use crate::installer::{CodeInstaller, CodeInstallResult, InstallError, StubInstallResult};
pub use crate::runtime::{NoSafepointScope, VmRuntime};
pub use crate::standalone::{RuntimeDescription, RuntimeDescriptionError, StandaloneRuntime};

pub mod assumptions;
pub mod config;
pub mod installer;
pub mod runtime;
pub mod scope_recorder;
pub mod site_dispatcher;
pub mod standalone;
pub mod value_translator;
