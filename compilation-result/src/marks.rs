use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Semantic marks the compiler attaches to code offsets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, FromPrimitive)]
pub enum MarkId {
    VerifiedEntry = 0x0001,
    UnverifiedEntry = 0x0002,
    OsrEntry = 0x0003,
    UnwindEntry = 0x0004,
    ExceptionHandlerEntry = 0x0005,
    DeoptHandlerEntry = 0x0006,
    StaticCallStub = 0x1000,
    InvokeInvalid = 0x2000,
    InvokeInterface = 0x2001,
    InvokeStatic = 0x2002,
    InvokeSpecial = 0x2003,
    InvokeVirtual = 0x2004,
    InlineInvokeVirtual = 0x2005,
    ImplicitNull = 0x3000,
    PollNear = 0x3001,
    PollReturnNear = 0x3002,
    PollFar = 0x3003,
    PollReturnFar = 0x3004,
    KlassPatching = 0x4000,
    DummyOopRelocation = 0x4001,
    AccessFieldPatching = 0x4002,
}

impl MarkId {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::from_i32(raw)
    }
}
