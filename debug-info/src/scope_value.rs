//! The values a deoptimized frame is rebuilt from.

use std::fmt::{Display, Formatter};

use installer_common::guarantee;
use installer_common::ids::ObjectHandle;

use crate::location::Location;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScopeValue {
    Location(Location),
    ConstantInt(i32),
    ConstantLong(i64),
    /// `None` is the null reference.
    ConstantOop(Option<ObjectHandle>),
    /// A scalar replaced object, reconstructed from the object pool of its safepoint.
    Object(ObjectRef),
}

impl ScopeValue {
    pub fn invalid() -> Self {
        ScopeValue::Location(Location::invalid())
    }

    pub fn is_location(&self) -> bool {
        matches!(self, ScopeValue::Location(_))
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            ScopeValue::Location(location) => Some(*location),
            _ => None
        }
    }
}

impl Display for ScopeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeValue::Location(location) => write!(f, "{}", location),
            ScopeValue::ConstantInt(value) => write!(f, "{}", value),
            ScopeValue::ConstantLong(value) => write!(f, "{}L", value),
            ScopeValue::ConstantOop(None) => write!(f, "null"),
            ScopeValue::ConstantOop(Some(handle)) => write!(f, "oop@{:#x}", handle.0),
            ScopeValue::Object(object) => write!(f, "obj[{}]", object.0),
        }
    }
}

/// Index of an object in the [`ObjectPool`] of one safepoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjectRef(pub usize);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectValue {
    pub id: i32,
    /// Mirror of the object's type.
    pub klass: ScopeValue,
    pub field_values: Vec<ScopeValue>,
}

/// The objects of one safepoint. Objects are allocated before their fields are known so that a
/// field can refer back to an object that is still being described.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectPool {
    objects: Vec<ObjectValue>,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, id: i32, klass: ScopeValue) -> ObjectRef {
        let object_ref = ObjectRef(self.objects.len());
        self.objects.push(ObjectValue { id, klass, field_values: vec![] });
        object_ref
    }

    pub fn set_field_values(&mut self, object: ObjectRef, field_values: Vec<ScopeValue>) {
        let object = &mut self.objects[object.0];
        guarantee!(object.field_values.is_empty(), "fields of object {} set twice", object.id);
        object.field_values = field_values;
    }

    pub fn get(&self, object: ObjectRef) -> &ObjectValue {
        &self.objects[object.0]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=(ObjectRef, &ObjectValue)> {
        self.objects.iter().enumerate().map(|(i, object)| (ObjectRef(i), object))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonitorValue {
    pub owner: ScopeValue,
    pub basic_lock: Location,
    pub eliminated: bool,
}

impl Display for MonitorValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "lock({} @ {}{})", self.owner, self.basic_lock, if self.eliminated { ", eliminated" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use installer_common::ids::ObjectHandle;

    use crate::location::{Location, LocationType};
    use crate::scope_value::{ObjectPool, ScopeValue};

    #[test]
    fn object_can_refer_to_itself() {
        let mut pool = ObjectPool::new();
        let node = pool.allocate(0, ScopeValue::ConstantOop(Some(ObjectHandle(0x10))));
        pool.set_field_values(node, vec![ScopeValue::Object(node), ScopeValue::ConstantInt(1)]);
        assert_eq!(pool.get(node).field_values[0], ScopeValue::Object(node));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn fields_are_set_once() {
        let mut pool = ObjectPool::new();
        let node = pool.allocate(3, ScopeValue::ConstantOop(None));
        pool.set_field_values(node, vec![ScopeValue::ConstantInt(1)]);
        pool.set_field_values(node, vec![ScopeValue::ConstantInt(2)]);
    }

    #[test]
    fn display() {
        assert_eq!(ScopeValue::invalid().to_string(), "invalid");
        assert_eq!(ScopeValue::Location(Location::new_stack_loc(LocationType::Lng, 16)).to_string(), "stack[16],lng");
        assert_eq!(ScopeValue::ConstantLong(-1).to_string(), "-1L");
    }
}
