use serde::{Deserialize, Serialize};

use installer_common::ids::{KlassId, MethodId, ObjectAddress};

/// An optimistic assumption the compiled code depends on.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Assumption {
    /// The method's bytecode is not redefined.
    MethodContents {
        method: MethodId,
    },
    /// `subtype` is the only concrete subtype of `context`.
    ConcreteSubtype {
        context: KlassId,
        subtype: KlassId,
    },
    /// `impl_` is the only implementation of `method` reachable from `context`.
    ConcreteMethod {
        method: MethodId,
        context: KlassId,
        impl_: MethodId,
    },
    LeafType {
        context: KlassId,
    },
    NoFinalizableSubclass {
        receiver_type: KlassId,
    },
    CallSiteTargetValue {
        call_site: ObjectAddress,
        method_handle: ObjectAddress,
    },
}
