//! AMD64 register numbering as used by the compiler.
//!
//! `0..16` are the general purpose registers, `16..32` the xmm registers.

use iced_x86::Register;

use installer_common::fatal;

pub const CPU_REGISTER_COUNT: u8 = 16;
pub const XMM_REGISTER_COUNT: u8 = 16;
pub const REGISTER_COUNT: u8 = CPU_REGISTER_COUNT + XMM_REGISTER_COUNT;

// rsp and rbp are the frame, r10 is scratch for inline cache calls
const OOP_ALLOWED: [bool; CPU_REGISTER_COUNT as usize] = [
    true, true, true, true, false, false, true, true,
    true, true, false, true, true, true, true, true,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RegisterNumber(pub u8);

impl RegisterNumber {
    pub fn from_raw(number: i32) -> Self {
        if number < 0 || number >= REGISTER_COUNT as i32 {
            fatal!("register number {} out of range", number);
        }
        Self(number as u8)
    }

    pub fn is_cpu(&self) -> bool {
        self.0 < CPU_REGISTER_COUNT
    }

    pub fn can_hold_oop(&self) -> bool {
        self.is_cpu() && OOP_ALLOWED[self.0 as usize]
    }

    pub fn to_native(&self) -> Register {
        match self.0 {
            0 => Register::RAX,
            1 => Register::RCX,
            2 => Register::RDX,
            3 => Register::RBX,
            4 => Register::RSP,
            5 => Register::RBP,
            6 => Register::RSI,
            7 => Register::RDI,
            8 => Register::R8,
            9 => Register::R9,
            10 => Register::R10,
            11 => Register::R11,
            12 => Register::R12,
            13 => Register::R13,
            14 => Register::R14,
            15 => Register::R15,
            16 => Register::XMM0,
            17 => Register::XMM1,
            18 => Register::XMM2,
            19 => Register::XMM3,
            20 => Register::XMM4,
            21 => Register::XMM5,
            22 => Register::XMM6,
            23 => Register::XMM7,
            24 => Register::XMM8,
            25 => Register::XMM9,
            26 => Register::XMM10,
            27 => Register::XMM11,
            28 => Register::XMM12,
            29 => Register::XMM13,
            30 => Register::XMM14,
            31 => Register::XMM15,
            _ => fatal!("register number {} out of range", self.0)
        }
    }
}

impl std::fmt::Display for RegisterNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self.to_native()).to_lowercase())
    }
}
