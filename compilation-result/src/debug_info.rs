use serde::{Deserialize, Serialize};

use installer_common::ids::MethodId;

use crate::value::{Value, VirtualObject};

/// Sentinel bci of a frame state before the method's first instruction.
pub const BEFORE_BCI: i32 = -1;
/// Sentinel bci of a frame state after the method returned or its lock was released.
pub const AFTER_BCI: i32 = -2;

const MAP_WORD_BITS: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Innermost frame, its callers are reached through [`BytecodeFrame::caller`].
    pub frame: BytecodeFrame,
    #[serde(default)]
    pub register_ref_map: Option<BitMap>,
    pub frame_ref_map: BitMap,
    #[serde(default)]
    pub virtual_objects: Vec<VirtualObject>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BytecodeFrame {
    #[serde(default)]
    pub caller: Option<Box<BytecodeFrame>>,
    pub method: MethodId,
    pub bci: i32,
    pub values: Vec<Value>,
    pub num_locals: usize,
    pub num_stack: usize,
    pub num_locks: usize,
    #[serde(default)]
    pub during_call: bool,
    #[serde(default)]
    pub rethrow_exception: bool,
    #[serde(default)]
    pub leaf_graph_id: i64,
}

impl BytecodeFrame {
    /// Number of frames in the chain starting at this one.
    pub fn depth(&self) -> usize {
        1 + self.caller.as_ref().map(|caller| caller.depth()).unwrap_or(0)
    }
}

/// Reference map bits as the compiler hands them over, 64 bits per word.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BitMap {
    pub words: Vec<u64>,
}

impl BitMap {
    pub fn with_size(bits: usize) -> Self {
        Self { words: vec![0; (bits + MAP_WORD_BITS - 1) / MAP_WORD_BITS] }
    }

    pub fn from_set_bits(bits: usize, set: &[usize]) -> Self {
        let mut res = Self::with_size(bits);
        for i in set {
            res.set(*i);
        }
        res
    }

    pub fn set(&mut self, i: usize) {
        let word = i / MAP_WORD_BITS;
        assert!(word < self.words.len(), "unexpected index");
        self.words[word] |= 1u64 << (i % MAP_WORD_BITS);
    }

    pub fn is_set(&self, i: usize) -> bool {
        let word = i / MAP_WORD_BITS;
        assert!(word < self.words.len(), "unexpected index");
        self.words[word] & (1u64 << (i % MAP_WORD_BITS)) != 0
    }

    pub fn size(&self) -> usize {
        self.words.len() * MAP_WORD_BITS
    }
}
