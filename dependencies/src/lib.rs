//! Facts about the class hierarchy that optimized code was compiled against.
//!
//! If one of them stops holding, code depending on it is invalid. They are checked once more
//! right before code is registered.

use std::fmt::{Display, Formatter};

use strum_macros::IntoStaticStr;
use thiserror::Error;
use tracing::trace;

use installer_common::ids::{KlassId, MethodId, ObjectAddress};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, IntoStaticStr)]
pub enum Dependency {
    /// The method's bytecode has not been redefined.
    #[strum(serialize = "evol_method")]
    EvolMethod { method: MethodId },
    #[strum(serialize = "leaf_type")]
    LeafType { context: KlassId },
    #[strum(serialize = "abstract_with_unique_concrete_subtype")]
    AbstractWithUniqueConcreteSubtype { context: KlassId, subtype: KlassId },
    #[strum(serialize = "unique_concrete_method")]
    UniqueConcreteMethod { context: KlassId, method: MethodId },
    #[strum(serialize = "no_finalizable_subclasses")]
    NoFinalizableSubclasses { context: KlassId },
    #[strum(serialize = "call_site_target_value")]
    CallSiteTargetValue { call_site: ObjectAddress, method_handle: ObjectAddress },
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name())?;
        match self {
            Dependency::EvolMethod { method } => write!(f, "{}", method)?,
            Dependency::LeafType { context } => write!(f, "{}", context)?,
            Dependency::AbstractWithUniqueConcreteSubtype { context, subtype } => write!(f, "{}, {}", context, subtype)?,
            Dependency::UniqueConcreteMethod { context, method } => write!(f, "{}, {}", context, method)?,
            Dependency::NoFinalizableSubclasses { context } => write!(f, "{}", context)?,
            Dependency::CallSiteTargetValue { call_site, method_handle } => write!(f, "{:#x}, {:#x}", call_site.0, method_handle.0)?,
        }
        write!(f, ")")
    }
}

/// The class hierarchy queries dependencies are validated with.
pub trait ClassHierarchy {
    fn is_abstract(&self, klass: KlassId) -> bool;
    fn subclasses(&self, klass: KlassId) -> Vec<KlassId>;
    /// The single concrete type at or below `context`, if there is exactly one.
    fn unique_concrete_subtype(&self, context: KlassId) -> Option<KlassId>;
    /// The single implementation `context` and its subtypes have for `method`, if there is exactly one.
    fn unique_concrete_method(&self, context: KlassId, method: MethodId) -> Option<MethodId>;
    fn has_finalizable_subclass(&self, klass: KlassId) -> bool;
    fn call_site_target(&self, call_site: ObjectAddress) -> Option<ObjectAddress>;
    fn is_method_evolved(&self, method: MethodId) -> bool;
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("dependency {dependency} no longer holds")]
pub struct DependencyViolation {
    pub dependency: Dependency,
}

#[derive(Clone, Debug, Default)]
pub struct Dependencies {
    dependencies: Vec<Dependency>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, dependency: Dependency) {
        if !self.dependencies.contains(&dependency) {
            trace!(%dependency, "dependency");
            self.dependencies.push(dependency);
        }
    }

    pub fn assert_evol_method(&mut self, method: MethodId) {
        self.add(Dependency::EvolMethod { method })
    }

    pub fn assert_leaf_type(&mut self, context: KlassId) {
        self.add(Dependency::LeafType { context })
    }

    pub fn assert_abstract_with_unique_concrete_subtype(&mut self, context: KlassId, subtype: KlassId) {
        self.add(Dependency::AbstractWithUniqueConcreteSubtype { context, subtype })
    }

    pub fn assert_unique_concrete_method(&mut self, context: KlassId, method: MethodId) {
        self.add(Dependency::UniqueConcreteMethod { context, method })
    }

    pub fn assert_has_no_finalizable_subclasses(&mut self, context: KlassId) {
        self.add(Dependency::NoFinalizableSubclasses { context })
    }

    pub fn assert_call_site_target_value(&mut self, call_site: ObjectAddress, method_handle: ObjectAddress) {
        self.add(Dependency::CallSiteTargetValue { call_site, method_handle })
    }

    pub fn iter(&self) -> impl Iterator<Item=&Dependency> {
        self.dependencies.iter()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Finds the first dependency that no longer holds.
    pub fn validate<H: ClassHierarchy + ?Sized>(&self, hierarchy: &H) -> Result<(), DependencyViolation> {
        for dependency in self.dependencies.iter() {
            if !holds(dependency, hierarchy) {
                return Err(DependencyViolation { dependency: *dependency });
            }
        }
        Ok(())
    }
}

fn holds<H: ClassHierarchy + ?Sized>(dependency: &Dependency, hierarchy: &H) -> bool {
    match *dependency {
        Dependency::EvolMethod { method } => !hierarchy.is_method_evolved(method),
        Dependency::LeafType { context } => hierarchy.subclasses(context).is_empty(),
        Dependency::AbstractWithUniqueConcreteSubtype { context, subtype } => {
            hierarchy.is_abstract(context) && hierarchy.unique_concrete_subtype(context) == Some(subtype)
        }
        Dependency::UniqueConcreteMethod { context, method } => {
            hierarchy.unique_concrete_method(context, method) == Some(method)
        }
        Dependency::NoFinalizableSubclasses { context } => !hierarchy.has_finalizable_subclass(context),
        Dependency::CallSiteTargetValue { call_site, method_handle } => {
            hierarchy.call_site_target(call_site) == Some(method_handle)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use installer_common::ids::{KlassId, MethodId, ObjectAddress};

    use crate::{ClassHierarchy, Dependencies, Dependency, DependencyViolation};

    struct Hierarchy {
        subclasses: HashMap<KlassId, Vec<KlassId>>,
        abstract_types: Vec<KlassId>,
    }

    impl ClassHierarchy for Hierarchy {
        fn is_abstract(&self, klass: KlassId) -> bool {
            self.abstract_types.contains(&klass)
        }

        fn subclasses(&self, klass: KlassId) -> Vec<KlassId> {
            self.subclasses.get(&klass).cloned().unwrap_or_default()
        }

        fn unique_concrete_subtype(&self, context: KlassId) -> Option<KlassId> {
            let concrete: Vec<KlassId> = self.subclasses(context).into_iter().filter(|klass| !self.is_abstract(*klass)).collect();
            match concrete.as_slice() {
                [only] => Some(*only),
                _ => None
            }
        }

        fn unique_concrete_method(&self, _context: KlassId, method: MethodId) -> Option<MethodId> {
            Some(method)
        }

        fn has_finalizable_subclass(&self, _klass: KlassId) -> bool {
            false
        }

        fn call_site_target(&self, _call_site: ObjectAddress) -> Option<ObjectAddress> {
            None
        }

        fn is_method_evolved(&self, method: MethodId) -> bool {
            method == MethodId(0xdead)
        }
    }

    fn hierarchy() -> Hierarchy {
        Hierarchy {
            subclasses: HashMap::from([(KlassId(1), vec![KlassId(2)])]),
            abstract_types: vec![KlassId(1)],
        }
    }

    #[test]
    fn duplicates_are_recorded_once() {
        let mut dependencies = Dependencies::new();
        dependencies.assert_leaf_type(KlassId(2));
        dependencies.assert_leaf_type(KlassId(2));
        dependencies.assert_evol_method(MethodId(3));
        assert_eq!(dependencies.len(), 2);
    }

    #[test]
    fn holding_dependencies_validate() {
        let mut dependencies = Dependencies::new();
        dependencies.assert_leaf_type(KlassId(2));
        dependencies.assert_abstract_with_unique_concrete_subtype(KlassId(1), KlassId(2));
        dependencies.assert_unique_concrete_method(KlassId(1), MethodId(7));
        assert_eq!(dependencies.validate(&hierarchy()), Ok(()));
    }

    #[test]
    fn first_broken_dependency_is_reported() {
        let mut dependencies = Dependencies::new();
        dependencies.assert_evol_method(MethodId(3));
        dependencies.assert_leaf_type(KlassId(1));
        dependencies.assert_evol_method(MethodId(0xdead));
        assert_eq!(dependencies.validate(&hierarchy()), Err(DependencyViolation { dependency: Dependency::LeafType { context: KlassId(1) } }));
    }

    #[test]
    fn display() {
        let dependency = Dependency::AbstractWithUniqueConcreteSubtype { context: KlassId(0x10), subtype: KlassId(0x20) };
        assert_eq!(dependency.to_string(), "abstract_with_unique_concrete_subtype(klass@0x10, klass@0x20)");
    }
}
