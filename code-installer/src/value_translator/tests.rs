use pretty_assertions::assert_eq;

use compilation_result::{Constant, StackLock, Value, VirtualObject};
use debug_info::{Location, LocationType, ObjectRef, ScopeValue};
use debug_info::oop_recorder::OopRecorder;
use installer_common::basic_type::BasicType;
use installer_common::ids::{KlassId, Metadata, ObjectAddress};
use oop_map::registers::RegisterNumber;

use crate::config::ByteOrder;
use crate::standalone::tests::runtime;
use crate::value_translator::{Translated, ValueTranslator};

const LONG_ARRAY: KlassId = KlassId(0x300);
const NODE: KlassId = KlassId(0x400);

fn reg(location_type: LocationType, number: u8) -> ScopeValue {
    ScopeValue::Location(Location::new_reg_loc(location_type, RegisterNumber(number)))
}

#[test]
fn wide_register_values_fill_two_slots() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    let long = translator.translate(&Value::register(0, BasicType::Long));
    assert_eq!(long, Translated { value: reg(LocationType::Lng, 0), second: Some(reg(LocationType::Lng, 0)) });
    let double = translator.translate(&Value::register(17, BasicType::Double));
    assert_eq!(double.second, Some(reg(LocationType::Dbl, 17)));
    assert_eq!(translator.translate(&Value::register(2, BasicType::Int)), Translated { value: reg(LocationType::IntInLong, 2), second: None });
    assert_eq!(translator.translate(&Value::register(3, BasicType::Object)).value, reg(LocationType::Oop, 3));
    assert_eq!(translator.translate(&Value::register(16, BasicType::Float)).value, reg(LocationType::Normal, 16));
}

#[test]
fn stack_slots_may_be_relative_to_the_caller() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    let incoming = translator.translate(&Value::StackSlot { offset: 8, add_frame_size: true, kind: BasicType::Object });
    assert_eq!(incoming.value, ScopeValue::Location(Location::new_stack_loc(LocationType::Oop, 40)));
    let double = translator.translate(&Value::stack_slot(16, BasicType::Double));
    assert_eq!(double.second, Some(double.value.clone()));
    assert_eq!(translator.translate(&Value::Illegal).value, ScopeValue::invalid());
}

#[test]
fn constants() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    assert_eq!(translator.translate(&Value::Constant(Constant::int(-3))).value, ScopeValue::ConstantInt(-3));
    assert_eq!(translator.translate(&Value::Constant(Constant::float(1.0))).value, ScopeValue::ConstantInt(1.0f32.to_bits() as i32));
    assert_eq!(translator.translate(&Value::Constant(Constant::long(1 << 40))), Translated {
        value: ScopeValue::ConstantLong(1 << 40),
        second: Some(ScopeValue::ConstantInt(0)),
    });
    assert_eq!(translator.translate(&Value::Constant(Constant::null())).value, ScopeValue::ConstantOop(None));
    assert_eq!(translator.translate(&Value::Constant(Constant::word(0x1234))).value, ScopeValue::ConstantLong(0x1234));
    match translator.translate(&Value::Constant(Constant::object(ObjectAddress(0x5000)))).value {
        ScopeValue::ConstantOop(Some(handle)) => assert_eq!(runtime.resolve_handle(handle), Some(ObjectAddress(0x5000))),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn embedded_metadata_is_recorded_once() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    {
        let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
        translator.translate(&Value::Constant(Constant::klass_pointer(NODE)));
        translator.translate(&Value::Constant(Constant::klass_pointer(NODE)));
    }
    assert_eq!(recorder.metadata(), &[Metadata::Klass(NODE)]);
}

#[test]
#[should_panic(expected = "klass@0x400 != 0x401")]
fn embedded_metadata_must_match_bits() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    let mut constant = Constant::klass_pointer(NODE);
    constant.primitive += 1;
    translator.translate(&Value::Constant(constant));
}

#[test]
fn self_referential_object_is_translated_once() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let objects = vec![VirtualObject {
        id: 0,
        object_type: NODE,
        values: vec![Value::VirtualObject { id: 0 }, Value::Constant(Constant::int(7))],
    }];
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &objects);
    let first = translator.translate(&Value::VirtualObject { id: 0 });
    let again = translator.translate(&Value::VirtualObject { id: 0 });
    assert_eq!(first.value, ScopeValue::Object(ObjectRef(0)));
    assert_eq!(again.value, first.value);
    let pool = translator.into_object_pool();
    assert_eq!(pool.len(), 1);
    let node = pool.get(ObjectRef(0));
    assert_eq!(node.field_values, vec![ScopeValue::Object(ObjectRef(0)), ScopeValue::ConstantInt(7)]);
    match node.klass {
        ScopeValue::ConstantOop(Some(handle)) => assert_eq!(runtime.resolve_handle(handle), Some(ObjectAddress(0x9400))),
        ref other => panic!("unexpected {:?}", other),
    }
}

fn long_array_fields(byte_order: ByteOrder) -> Vec<ScopeValue> {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let objects = vec![VirtualObject {
        id: 5,
        object_type: LONG_ARRAY,
        values: vec![Value::Constant(Constant::int(1)), Value::Constant(Constant::long(2)), Value::Illegal],
    }];
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, byte_order, 32, &objects);
    translator.translate(&Value::VirtualObject { id: 5 });
    translator.into_object_pool().get(ObjectRef(0)).field_values.clone()
}

#[test]
fn long_array_filler_follows_little_endian_order() {
    assert_eq!(long_array_fields(ByteOrder::LittleEndian), vec![
        ScopeValue::ConstantInt(0),
        ScopeValue::ConstantInt(1),
        ScopeValue::ConstantInt(0),
        ScopeValue::ConstantLong(2),
        ScopeValue::ConstantInt(0),
        ScopeValue::invalid(),
    ]);
}

#[test]
fn long_array_filler_follows_big_endian_order() {
    assert_eq!(long_array_fields(ByteOrder::BigEndian), vec![
        ScopeValue::ConstantInt(1),
        ScopeValue::ConstantInt(0),
        ScopeValue::ConstantInt(0),
        ScopeValue::ConstantLong(2),
        ScopeValue::invalid(),
        ScopeValue::ConstantInt(0),
    ]);
}

#[test]
fn monitors() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    let lock = Value::StackLock(Box::new(StackLock {
        owner: Value::register(1, BasicType::Object),
        slot: Value::stack_slot(24, BasicType::Long),
        eliminated: true,
    }));
    let monitor = translator.translate_monitor(&lock);
    assert_eq!(monitor.owner, reg(LocationType::Oop, 1));
    assert_eq!(monitor.basic_lock, Location::new_stack_loc(LocationType::Lng, 24));
    assert!(monitor.eliminated);
}

#[test]
#[should_panic(expected = "only float and double expected in xmm register")]
fn object_in_xmm_register_is_fatal() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    translator.translate(&Value::register(20, BasicType::Object));
}

#[test]
#[should_panic(expected = "virtual object 9 is not described")]
fn undescribed_virtual_object_is_fatal() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    translator.translate(&Value::VirtualObject { id: 9 });
}

#[test]
#[should_panic(expected = "outside of the lock section")]
fn lock_outside_lock_section_is_fatal() {
    let runtime = runtime();
    let mut recorder = OopRecorder::new();
    let mut translator = ValueTranslator::new(&runtime, &mut recorder, ByteOrder::LittleEndian, 32, &[]);
    translator.translate(&Value::StackLock(Box::new(StackLock {
        owner: Value::Constant(Constant::null()),
        slot: Value::stack_slot(0, BasicType::Long),
        eliminated: false,
    })));
}
