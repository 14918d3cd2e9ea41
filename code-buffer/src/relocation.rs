use strum_macros::Display;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display)]
pub enum SectionId {
    Consts,
    Insts,
}

/// How a patched location has to be adjusted when the code moves.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
pub enum RelocationKind {
    None,
    RuntimeCall,
    /// A call bound through an inline cache, whose `mov` is at `inline_cache_offset`.
    VirtualCall {
        inline_cache_offset: usize,
    },
    OptVirtualCall,
    StaticCall,
    /// Links a static call stub back to the call it serves.
    StaticStub {
        call_offset: usize,
    },
    SectionWord {
        section: SectionId,
        target_offset: usize,
    },
    Oop,
    Metadata,
    Poll,
    PollReturn,
}

impl RelocationKind {
    /// Calls whose rel32 points at an address outside of the buffer.
    pub fn is_call(&self) -> bool {
        matches!(self, RelocationKind::RuntimeCall | RelocationKind::VirtualCall { .. } | RelocationKind::OptVirtualCall | RelocationKind::StaticCall)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Display)]
pub enum OperandFormat {
    None,
    Call32,
    Imm,
    Disp32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Relocation {
    /// Start of the relocated instruction in the instruction section.
    pub offset: usize,
    pub kind: RelocationKind,
    pub format: OperandFormat,
}
