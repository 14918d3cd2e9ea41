//! Everything the runtime needs to walk, unwind and deoptimize an installed method: scope values,
//! per-safepoint scope chains, the metadata and oop tables and the exception tables.

pub mod exception_table;
pub mod location;
pub mod oop_recorder;
pub mod recorder;
pub mod scope_value;

pub use location::{Location, LocationType, LocationWhere};
pub use recorder::{DebugInformationRecorder, PcDesc, ScopeDesc};
pub use scope_value::{MonitorValue, ObjectPool, ObjectRef, ObjectValue, ScopeValue};
