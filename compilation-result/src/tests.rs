use installer_common::basic_type::BasicType;
use installer_common::ids::MethodId;

use crate::{BitMap, BytecodeFrame, CallTarget, CompilationResult, MarkId, SiteKind, Value};

const SMALL_UNIT: &str = r#"
CompilationResult(
    name: "Test.run()V",
    method: Some(MethodId(0x1000)),
    target_code: [0xE8, 0, 0, 0, 0, 0xC3],
    target_code_size: 6,
    frame_size: 16,
    sites: [
        Site(pc_offset: 5, kind: Mark(id: 0x3002)),
        Site(pc_offset: 0, kind: Call(target: RuntimeStub(7), debug_info: None)),
        Site(pc_offset: 0, kind: Mark(id: 0x0001)),
    ],
)
"#;

#[test]
fn compiled_unit_loads_from_ron() {
    let result: CompilationResult = ron::from_str(SMALL_UNIT).unwrap();
    assert_eq!(result.method, Some(MethodId(0x1000)));
    assert!(!result.is_osr());
    assert_eq!(result.custom_stack_area_offset, -1);
    assert!(result.assumptions.is_empty());
    assert_eq!(result.sites.len(), 3);
    assert!(matches!(result.sites[1].kind, SiteKind::Call { target: CallTarget::RuntimeStub(7), debug_info: None }));
}

#[test]
fn sites_are_ordered_stably_by_offset() {
    let result: CompilationResult = ron::from_str(SMALL_UNIT).unwrap();
    let ordered = result.sites_in_offset_order();
    let names = ordered.iter().map(|site| (site.pc_offset, site.kind.name())).collect::<Vec<_>>();
    assert_eq!(names, vec![(0, "call"), (0, "mark"), (5, "mark")]);
}

#[test]
fn bit_map_sets_and_reads_across_words() {
    let map = BitMap::from_set_bits(130, &[0, 63, 64, 129]);
    assert_eq!(map.size(), 192);
    assert!(map.is_set(0));
    assert!(map.is_set(63));
    assert!(map.is_set(64));
    assert!(map.is_set(129));
    assert!(!map.is_set(1));
    assert!(!map.is_set(128));
}

#[test]
#[should_panic]
fn bit_map_rejects_index_past_end() {
    BitMap::with_size(64).is_set(64);
}

#[test]
fn mark_ids_decode() {
    assert_eq!(MarkId::from_raw(0x2004), Some(MarkId::InvokeVirtual));
    assert_eq!(MarkId::from_raw(0x7777), None);
}

fn frame(method: u64, caller: Option<BytecodeFrame>) -> BytecodeFrame {
    BytecodeFrame {
        caller: caller.map(Box::new),
        method: MethodId(method),
        bci: 3,
        values: vec![Value::register(0, BasicType::Int)],
        num_locals: 1,
        num_stack: 0,
        num_locks: 0,
        during_call: false,
        rethrow_exception: false,
        leaf_graph_id: 0,
    }
}

#[test]
fn frame_depth_follows_callers() {
    let chain = frame(3, Some(frame(2, Some(frame(1, None)))));
    assert_eq!(chain.depth(), 3);
}
