use serde::{Deserialize, Serialize};

use installer_common::basic_type::BasicType;
use installer_common::ids::{KlassId, ObjectAddress};

/// Where the compiler put a logical value at a suspension point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Illegal,
    Register {
        number: i32,
        kind: BasicType,
    },
    StackSlot {
        offset: i32,
        add_frame_size: bool,
        kind: BasicType,
    },
    Constant(Constant),
    /// A scalar-replaced object, described in [`crate::DebugInfo::virtual_objects`].
    VirtualObject {
        id: i32,
    },
    /// Only valid in the lock section of a frame.
    StackLock(Box<StackLock>),
}

impl Value {
    pub fn kind(&self) -> BasicType {
        match self {
            Value::Illegal => BasicType::Illegal,
            Value::Register { kind, .. } => *kind,
            Value::StackSlot { kind, .. } => *kind,
            Value::Constant(constant) => constant.kind,
            Value::VirtualObject { .. } => BasicType::Object,
            Value::StackLock(_) => BasicType::Object,
        }
    }

    pub fn is_illegal(&self) -> bool {
        matches!(self, Value::Illegal)
    }

    pub fn register(number: i32, kind: BasicType) -> Self {
        Value::Register { number, kind }
    }

    pub fn stack_slot(offset: i32, kind: BasicType) -> Self {
        Value::StackSlot { offset, add_frame_size: false, kind }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub kind: BasicType,
    /// Raw bits of primitive and word constants.
    #[serde(default)]
    pub primitive: i64,
    #[serde(default)]
    pub object: Option<ConstantObject>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstantObject {
    Heap(ObjectAddress),
    /// A type identity carried by a word constant, whose bits must equal the type's address.
    Type(KlassId),
    /// Producer-side annotation on a word constant, carries no runtime identity.
    Annotation(String),
}

impl Constant {
    pub fn int(value: i32) -> Self {
        Self { kind: BasicType::Int, primitive: value as i64, object: None }
    }

    pub fn float(value: f32) -> Self {
        Self { kind: BasicType::Float, primitive: value.to_bits() as i32 as i64, object: None }
    }

    pub fn long(value: i64) -> Self {
        Self { kind: BasicType::Long, primitive: value, object: None }
    }

    pub fn double(value: f64) -> Self {
        Self { kind: BasicType::Double, primitive: value.to_bits() as i64, object: None }
    }

    pub fn null() -> Self {
        Self { kind: BasicType::Object, primitive: 0, object: None }
    }

    pub fn object(address: ObjectAddress) -> Self {
        Self { kind: BasicType::Object, primitive: 0, object: Some(ConstantObject::Heap(address)) }
    }

    pub fn word(bits: i64) -> Self {
        Self { kind: BasicType::Word, primitive: bits, object: None }
    }

    pub fn klass_pointer(klass: KlassId) -> Self {
        Self { kind: BasicType::Word, primitive: klass.0 as i64, object: Some(ConstantObject::Type(klass)) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VirtualObject {
    pub id: i32,
    pub object_type: KlassId,
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackLock {
    pub owner: Value,
    /// Stack location of the lock record, a two slot value.
    pub slot: Value,
    pub eliminated: bool,
}
