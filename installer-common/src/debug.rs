//! Contract-violation reporting.
//!
//! The compiler and the installer are built as a matched pair, so malformed compiler output is a
//! build defect rather than something to recover from. These macros log the failed condition with
//! its source location and then panic; release builds abort on panic.

#[doc(hidden)]
pub use tracing as __tracing;

#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        $crate::debug::__tracing::error!(file = file!(), line = line!(), "fatal error: {}", message);
        panic!("fatal error at {}:{}: {}", file!(), line!(), message)
    }};
}

#[macro_export]
macro_rules! guarantee {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal!("guarantee({}) failed: {}", stringify!($cond), format!($($arg)+));
        }
    };
}

#[macro_export]
macro_rules! should_not_reach_here {
    () => {
        $crate::fatal!("should not reach here")
    };
    ($($arg:tt)+) => {
        $crate::fatal!("should not reach here: {}", format!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn guarantee_passes_on_true() {
        guarantee!(1 + 1 == 2, "arithmetic is broken");
    }

    #[test]
    #[should_panic(expected = "guarantee(1 + 1 == 3) failed: expected 3")]
    fn guarantee_reports_condition() {
        guarantee!(1 + 1 == 3, "expected {}", 3);
    }

    #[test]
    #[should_panic(expected = "should not reach here: mark 7")]
    fn should_not_reach_here_formats() {
        should_not_reach_here!("mark {}", 7);
    }
}
