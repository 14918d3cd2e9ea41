//! Turns the compiler's description of where a value lives into the scope values deoptimization
//! reads.

use std::collections::HashMap;

use tracing::trace;

use compilation_result::{Constant, ConstantObject, Value, VirtualObject};
use debug_info::{Location, LocationType, MonitorValue, ObjectPool, ObjectRef, ScopeValue};
use debug_info::oop_recorder::OopRecorder;
use installer_common::basic_type::BasicType;
use installer_common::ids::{Metadata, ObjectAddress, ObjectHandle};
use installer_common::{fatal, guarantee};
use oop_map::registers::RegisterNumber;

use crate::config::ByteOrder;
use crate::runtime::VmRuntime;

/// A translated value. Wide values also produce a `second` scope value, which precedes the
/// primary one in the scope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Translated {
    pub value: ScopeValue,
    pub second: Option<ScopeValue>,
}

impl Translated {
    fn single(value: ScopeValue) -> Self {
        Self { value, second: None }
    }

    fn wide(value: ScopeValue) -> Self {
        Self { second: Some(value.clone()), value }
    }
}

/// Translates the values of one safepoint. Virtual objects are shared across all scopes of the
/// safepoint and end up in its object pool.
pub struct ValueTranslator<'l> {
    runtime: &'l dyn VmRuntime,
    oop_recorder: &'l mut OopRecorder,
    byte_order: ByteOrder,
    total_frame_size: i32,
    virtual_objects: HashMap<i32, &'l VirtualObject>,
    objects: ObjectPool,
    seen: HashMap<i32, ObjectRef>,
}

impl<'l> ValueTranslator<'l> {
    pub fn new(runtime: &'l dyn VmRuntime, oop_recorder: &'l mut OopRecorder, byte_order: ByteOrder, total_frame_size: i32, virtual_objects: &'l [VirtualObject]) -> Self {
        let mut by_id = HashMap::new();
        for virtual_object in virtual_objects {
            guarantee!(by_id.insert(virtual_object.id, virtual_object).is_none(), "virtual object {} described twice", virtual_object.id);
        }
        Self {
            runtime,
            oop_recorder,
            byte_order,
            total_frame_size,
            virtual_objects: by_id,
            objects: ObjectPool::new(),
            seen: HashMap::new(),
        }
    }

    pub fn oop_recorder(&mut self) -> &mut OopRecorder {
        &mut *self.oop_recorder
    }

    /// Handles are recorded so the installer can give them back if the code is never installed.
    fn make_local(&mut self, object: ObjectAddress) -> ObjectHandle {
        let handle = self.runtime.make_local(object);
        self.oop_recorder.find_oop_index(handle);
        handle
    }

    pub fn translate(&mut self, value: &Value) -> Translated {
        match value {
            Value::Illegal => Translated::single(ScopeValue::invalid()),
            Value::Register { number, kind } => translate_register(RegisterNumber::from_raw(*number), *kind),
            Value::StackSlot { offset, add_frame_size, kind } => {
                let offset = if *add_frame_size { offset + self.total_frame_size } else { *offset };
                let location_type = match kind {
                    BasicType::Double => LocationType::Dbl,
                    BasicType::Long => LocationType::Lng,
                    BasicType::Object => LocationType::Oop,
                    _ => LocationType::Normal,
                };
                let location = ScopeValue::Location(Location::new_stack_loc(location_type, offset));
                if kind.is_wide() {
                    Translated::wide(location)
                } else {
                    Translated::single(location)
                }
            }
            Value::Constant(constant) => self.translate_constant(constant),
            Value::VirtualObject { id } => Translated::single(ScopeValue::Object(self.translate_virtual_object(*id))),
            Value::StackLock(_) => fatal!("lock {:?} outside of the lock section of a frame", value),
        }
    }

    fn translate_constant(&mut self, constant: &Constant) -> Translated {
        record_metadata_in_constant(constant, &mut *self.oop_recorder);
        match constant.kind {
            kind if kind.is_int_like() => Translated::single(ScopeValue::ConstantInt(constant.primitive as i32)),
            BasicType::Long | BasicType::Double => Translated {
                value: ScopeValue::ConstantLong(constant.primitive),
                second: Some(ScopeValue::ConstantInt(0)),
            },
            BasicType::Object => match &constant.object {
                None => Translated::single(ScopeValue::ConstantOop(None)),
                Some(ConstantObject::Heap(address)) => Translated::single(ScopeValue::ConstantOop(Some(self.make_local(*address)))),
                Some(other) => fatal!("object constant carries {:?} instead of a heap object", other),
            },
            BasicType::Word => Translated::single(ScopeValue::ConstantLong(constant.primitive)),
            kind => fatal!("unexpected constant kind {}", kind),
        }
    }

    fn translate_virtual_object(&mut self, id: i32) -> ObjectRef {
        if let Some(object) = self.seen.get(&id) {
            return *object;
        }
        let virtual_object = match self.virtual_objects.get(&id) {
            Some(virtual_object) => *virtual_object,
            None => fatal!("virtual object {} is not described", id),
        };
        let mirror = self.runtime.java_mirror(virtual_object.object_type);
        let is_long_array = virtual_object.object_type == self.runtime.long_array_klass();
        let mirror = self.make_local(mirror);
        let object = self.objects.allocate(id, ScopeValue::ConstantOop(Some(mirror)));
        self.seen.insert(id, object);
        trace!(id, object_type = %virtual_object.object_type, fields = virtual_object.values.len(), "virtual object");

        let mut field_values = vec![];
        for value in virtual_object.values.iter() {
            let Translated { mut value, mut second } = self.translate(value);
            if is_long_array && second.is_none() {
                // a narrow value stored into a long array element, zero the other half
                match self.byte_order {
                    ByteOrder::LittleEndian => {
                        second = Some(ScopeValue::ConstantInt(0));
                    }
                    ByteOrder::BigEndian => {
                        second = Some(value);
                        value = ScopeValue::ConstantInt(0);
                    }
                }
            }
            if let Some(second) = second {
                field_values.push(second);
            }
            field_values.push(value);
        }
        self.objects.set_field_values(object, field_values);
        object
    }

    pub fn translate_monitor(&mut self, value: &Value) -> MonitorValue {
        let lock = match value {
            Value::StackLock(lock) => lock,
            _ => fatal!("monitors must be stack locks, got {:?}", value),
        };
        let owner = self.translate(&lock.owner);
        guarantee!(owner.second.is_none(), "monitor owner cannot occupy two stack slots");
        let lock_data = self.translate(&lock.slot);
        guarantee!(lock_data.second.as_ref() == Some(&lock_data.value), "monitor lock data must be a two slot value");
        let basic_lock = match lock_data.value.location() {
            Some(location) => location,
            None => fatal!("invalid monitor location {}", lock_data.value),
        };
        MonitorValue { owner: owner.value, basic_lock, eliminated: lock.eliminated }
    }

    pub fn into_object_pool(self) -> ObjectPool {
        self.objects
    }
}

fn translate_register(register: RegisterNumber, kind: BasicType) -> Translated {
    if register.is_cpu() {
        let location_type = match kind {
            kind if kind.is_int_like() => LocationType::IntInLong,
            BasicType::Word => LocationType::IntInLong,
            BasicType::Long => LocationType::Lng,
            BasicType::Object => LocationType::Oop,
            kind => fatal!("unexpected type {} in cpu register {}", kind, register),
        };
        let location = ScopeValue::Location(Location::new_reg_loc(location_type, register));
        if kind == BasicType::Long {
            Translated::wide(location)
        } else {
            Translated::single(location)
        }
    } else {
        match kind {
            BasicType::Float => Translated::single(ScopeValue::Location(Location::new_reg_loc(LocationType::Normal, register))),
            BasicType::Double => Translated::wide(ScopeValue::Location(Location::new_reg_loc(LocationType::Dbl, register))),
            kind => fatal!("only float and double expected in xmm register {}, got {}", register, kind),
        }
    }
}

/// Registers type metadata embedded in a word constant with the oop recorder.
pub fn record_metadata_in_constant(constant: &Constant, oop_recorder: &mut OopRecorder) {
    if !matches!(constant.kind, BasicType::Word | BasicType::Long) {
        return;
    }
    match &constant.object {
        None => {}
        Some(ConstantObject::Type(klass)) => {
            guarantee!(constant.primitive as u64 == klass.0, "{} != {:#x}", klass, constant.primitive);
            let index = oop_recorder.find_metadata_index(Metadata::Klass(*klass));
            trace!(index, count = oop_recorder.metadata().len(), %klass, "metadata");
        }
        Some(ConstantObject::Annotation(_)) => {}
        Some(ConstantObject::Heap(address)) => {
            fatal!("unexpected annotation {:#x} for constant {} of kind {}", address.0, constant.primitive, constant.kind.type_char());
        }
    }
}

#[cfg(test)]
mod tests;
