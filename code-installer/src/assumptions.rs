use compilation_result::Assumption;
use dependencies::{ClassHierarchy, Dependencies};
use installer_common::guarantee;

pub fn record_assumptions<H: ClassHierarchy + ?Sized>(hierarchy: &H, assumptions: &[Assumption]) -> Dependencies {
    let mut dependencies = Dependencies::new();
    for assumption in assumptions {
        record_assumption(hierarchy, &mut dependencies, assumption);
    }
    dependencies
}

fn record_assumption<H: ClassHierarchy + ?Sized>(hierarchy: &H, dependencies: &mut Dependencies, assumption: &Assumption) {
    match assumption {
        Assumption::MethodContents { method } => {
            dependencies.assert_evol_method(*method);
        }
        Assumption::ConcreteSubtype { context, subtype } => {
            dependencies.assert_leaf_type(*subtype);
            if context != subtype {
                guarantee!(hierarchy.is_abstract(*context), "concrete subtype assumption on non-abstract context {}", context);
                dependencies.assert_abstract_with_unique_concrete_subtype(*context, *subtype);
            }
        }
        Assumption::ConcreteMethod { method: _, context, impl_ } => {
            dependencies.assert_unique_concrete_method(*context, *impl_);
        }
        Assumption::LeafType { context } => {
            dependencies.assert_leaf_type(*context);
        }
        Assumption::NoFinalizableSubclass { receiver_type } => {
            dependencies.assert_has_no_finalizable_subclasses(*receiver_type);
        }
        Assumption::CallSiteTargetValue { call_site, method_handle } => {
            dependencies.assert_call_site_target_value(*call_site, *method_handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use compilation_result::Assumption;
    use dependencies::Dependency;
    use installer_common::ids::{KlassId, MethodId};

    use crate::assumptions::record_assumptions;
    use crate::standalone::tests::runtime;

    #[test]
    fn concrete_subtype_of_abstract_context() {
        let runtime = runtime();
        let dependencies = record_assumptions(&runtime, &[
            Assumption::MethodContents { method: MethodId(0x1000) },
            Assumption::ConcreteSubtype { context: KlassId(0x100), subtype: KlassId(0x200) },
            Assumption::ConcreteMethod { method: MethodId(0x1000), context: KlassId(0x100), impl_: MethodId(0x2000) },
        ]);
        assert_eq!(dependencies.iter().copied().collect::<Vec<_>>(), vec![
            Dependency::EvolMethod { method: MethodId(0x1000) },
            Dependency::LeafType { context: KlassId(0x200) },
            Dependency::AbstractWithUniqueConcreteSubtype { context: KlassId(0x100), subtype: KlassId(0x200) },
            Dependency::UniqueConcreteMethod { context: KlassId(0x100), method: MethodId(0x2000) },
        ]);
        assert!(dependencies.validate(&runtime).is_ok());
    }

    #[test]
    fn concrete_subtype_of_itself_is_a_leaf_type() {
        let runtime = runtime();
        let dependencies = record_assumptions(&runtime, &[
            Assumption::ConcreteSubtype { context: KlassId(0x200), subtype: KlassId(0x200) },
            Assumption::LeafType { context: KlassId(0x200) },
            Assumption::NoFinalizableSubclass { receiver_type: KlassId(0x400) },
        ]);
        assert_eq!(dependencies.iter().copied().collect::<Vec<_>>(), vec![
            Dependency::LeafType { context: KlassId(0x200) },
            Dependency::NoFinalizableSubclasses { context: KlassId(0x400) },
        ]);
    }

    #[test]
    #[should_panic(expected = "non-abstract context")]
    fn concrete_context_is_fatal() {
        let runtime = runtime();
        record_assumptions(&runtime, &[Assumption::ConcreteSubtype { context: KlassId(0x200), subtype: KlassId(0x400) }]);
    }
}
