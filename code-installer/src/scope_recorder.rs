use tracing::debug;

use compilation_result::{BytecodeFrame, DebugInfo, AFTER_BCI, BEFORE_BCI};
use debug_info::{DebugInformationRecorder, ScopeDesc};
use installer_common::guarantee;
use installer_common::ids::Metadata;

use crate::value_translator::{Translated, ValueTranslator};

/// Records the whole inlining chain of `debug_info` at the open safepoint `pc_offset`.
pub fn record_scopes(recorder: &mut DebugInformationRecorder, mut translator: ValueTranslator, pc_offset: usize, debug_info: &DebugInfo) {
    record_scope(recorder, &mut translator, pc_offset, &debug_info.frame);
    recorder.dump_object_pool(pc_offset, translator.into_object_pool());
}

/// Callers are recorded before the frames they inlined.
pub fn record_scope(recorder: &mut DebugInformationRecorder, translator: &mut ValueTranslator, pc_offset: usize, frame: &BytecodeFrame) {
    if let Some(caller) = frame.caller.as_ref() {
        record_scope(recorder, translator, pc_offset, caller);
    }

    translator.oop_recorder().find_metadata_index(Metadata::Method(frame.method));
    let reexecute = if frame.bci == BEFORE_BCI || frame.bci == AFTER_BCI {
        false
    } else {
        !frame.during_call
    };

    debug!(pc_offset, bci = frame.bci, locals = frame.num_locals, expressions = frame.num_stack, monitors = frame.num_locks, "recording scope");
    let values = frame.values.as_slice();
    guarantee!(frame.num_locals + frame.num_stack + frame.num_locks == values.len(), "unexpected values length {} for {} locals, {} expressions and {} monitors", values.len(), frame.num_locals, frame.num_stack, frame.num_locks);

    let mut locals = vec![];
    let mut expressions = vec![];
    let mut monitors = vec![];
    let mut i = 0;
    while i < values.len() {
        let value = &values[i];
        let mut wide = false;
        if i < frame.num_locals + frame.num_stack {
            let Translated { value, second } = translator.translate(value);
            let target = if i < frame.num_locals { &mut locals } else { &mut expressions };
            if let Some(second) = second {
                target.push(second);
                wide = true;
            }
            target.push(value);
        } else {
            monitors.push(translator.translate_monitor(value));
        }
        if wide {
            i += 1;
            guarantee!(i < values.len(), "double-slot value not followed by Illegal");
            guarantee!(values[i].is_illegal(), "double-slot value not followed by Illegal");
        }
        i += 1;
    }

    recorder.describe_scope(pc_offset, ScopeDesc {
        method: frame.method,
        bci: frame.bci,
        reexecute,
        rethrow_exception: frame.rethrow_exception,
        locals,
        expressions,
        monitors,
    });
}
