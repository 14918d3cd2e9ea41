use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Logical kind of a value as the compiler describes it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum BasicType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    Object,
    // machine word, used for raw addresses and embedded metadata
    Word,
    Illegal,
}

impl BasicType {
    pub fn from_type_char(type_char: char) -> Option<Self> {
        Some(match type_char {
            'z' => BasicType::Boolean,
            'b' => BasicType::Byte,
            's' => BasicType::Short,
            'c' => BasicType::Char,
            'i' => BasicType::Int,
            'f' => BasicType::Float,
            'j' => BasicType::Long,
            'd' => BasicType::Double,
            'a' => BasicType::Object,
            'w' => BasicType::Word,
            '-' => BasicType::Illegal,
            _ => return None
        })
    }

    pub fn type_char(&self) -> char {
        match self {
            BasicType::Boolean => 'z',
            BasicType::Byte => 'b',
            BasicType::Short => 's',
            BasicType::Char => 'c',
            BasicType::Int => 'i',
            BasicType::Float => 'f',
            BasicType::Long => 'j',
            BasicType::Double => 'd',
            BasicType::Object => 'a',
            BasicType::Word => 'w',
            BasicType::Illegal => '-',
        }
    }

    /// Takes two interpreter slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, BasicType::Long | BasicType::Double)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, BasicType::Object)
    }

    /// Fits in a 32 bit constant.
    pub fn is_int_like(&self) -> bool {
        matches!(self, BasicType::Boolean | BasicType::Byte | BasicType::Short | BasicType::Char | BasicType::Int | BasicType::Float)
    }
}
