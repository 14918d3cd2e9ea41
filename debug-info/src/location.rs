use std::fmt::{Display, Formatter};

use strum_macros::Display;

use oop_map::registers::RegisterNumber;

/// How the bits at a location are to be interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display)]
pub enum LocationType {
    #[strum(serialize = "normal")]
    Normal,
    #[strum(serialize = "oop")]
    Oop,
    /// An int sign-extended into a 64 bit register
    #[strum(serialize = "int_in_long")]
    IntInLong,
    #[strum(serialize = "lng")]
    Lng,
    #[strum(serialize = "dbl")]
    Dbl,
    #[strum(serialize = "invalid")]
    Invalid,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LocationWhere {
    /// Byte offset from the stack pointer.
    OnStack(i32),
    InRegister(RegisterNumber),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Location {
    pub location_where: LocationWhere,
    pub location_type: LocationType,
}

impl Location {
    pub fn new_stack_loc(location_type: LocationType, offset: i32) -> Self {
        Self { location_where: LocationWhere::OnStack(offset), location_type }
    }

    pub fn new_reg_loc(location_type: LocationType, register: RegisterNumber) -> Self {
        Self { location_where: LocationWhere::InRegister(register), location_type }
    }

    pub fn invalid() -> Self {
        Self { location_where: LocationWhere::OnStack(0), location_type: LocationType::Invalid }
    }

    pub fn is_invalid(&self) -> bool {
        self.location_type == LocationType::Invalid
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.location_where, LocationWhere::OnStack(_))
    }

    pub fn is_register(&self) -> bool {
        matches!(self.location_where, LocationWhere::InRegister(_))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_invalid() {
            return write!(f, "invalid");
        }
        match self.location_where {
            LocationWhere::OnStack(offset) => write!(f, "stack[{}]", offset)?,
            LocationWhere::InRegister(register) => write!(f, "{}", register)?,
        }
        match self.location_type {
            LocationType::Normal => Ok(()),
            location_type => write!(f, ",{}", location_type),
        }
    }
}
