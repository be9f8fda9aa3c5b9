// NOTE: Exporting macros in Rust is a bit weird. `#[macro_export]` causes them to be
//       exported to the crate root, but that makes it difficult to include just the
//       macros without using `#[macro_use] extern crate frazil;`. That's why the macros
//       are also re-exported from this module.

/// Write something to the logger. The logger is whatever the client installed through
/// the `log` crate's facade; nothing is written if no logger was installed.
#[macro_export]
macro_rules! frazil_log {
    ($($args:tt)*) => (
        $crate::log::info!($($args)*)
    );
}
pub use frazil_log;

/// Similar to `frazil_log!()`, more scream-y. Used for printing fatal errors.
#[macro_export]
macro_rules! frazil_error {
    ($($args:tt)*) => (
        $crate::log::error!($($args)*)
    );
}
pub use frazil_error;

/// The same as `frazil_log!()`, but only shown when compiling in debug mode. Allowed on
/// the DSP thread because the allocation guard is lifted around the call.
#[macro_export]
macro_rules! frazil_trace {
    ($($args:tt)*) => (
        $crate::util::permit_alloc(|| $crate::log::trace!($($args)*))
    );
}
pub use frazil_trace;

/// Analogue to the `dbg!()` macro with all of the same logging features as the other
/// `frazil_*!()` macros. Like the `frazil_debug_assert*!()` macros, this is only shown
/// when compiling in debug mode, but the macro will still return the value in non-debug
/// modes.
#[macro_export]
macro_rules! frazil_dbg {
    () => {
        $crate::util::permit_alloc(|| $crate::log::debug!(""));
    };
    ($val:expr $(,)?) => {
        // Match here acts as a let-binding: https://stackoverflow.com/questions/48732263/why-is-rusts-assert-eq-implemented-using-a-match/48732525#48732525
        match $val {
            tmp => {
                $crate::util::permit_alloc(|| $crate::log::debug!("{} = {:#?}", stringify!($val), &tmp));
                tmp
            }
        }
    };
    ($($val:expr),+ $(,)?) => { ($($crate::frazil_dbg!($val)),+,) };
}
pub use frazil_dbg;

/// A `debug_assert!()` analogue that prints the error with line number information
/// instead of panicking. Used for contract violations that the caller may be able to
/// limp along after.
#[macro_export]
macro_rules! frazil_debug_assert {
    ($cond:expr $(,)?) => (
        if cfg!(debug_assertions) && !$cond {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($cond))));
        }
    );
    ($cond:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(debug_assertions) && !$cond {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($cond), ", ", $format), $($($args)*)?));
        }
    );
}
pub use frazil_debug_assert;

/// An unconditional debug assertion failure, for if the condition has already been
/// checked elsewhere.
#[macro_export]
macro_rules! frazil_debug_assert_failure {
    () => (
        if cfg!(debug_assertions) {
            $crate::util::permit_alloc(|| $crate::log::debug!("Debug assertion failed"));
        }
    );
    ($format:expr $(, $($args:tt)*)?) => (
        if cfg!(debug_assertions) {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", $format), $($($args)*)?));
        }
    );
}
pub use frazil_debug_assert_failure;

/// A `debug_assert_eq!()` analogue that prints the error with line number information
/// instead of panicking.
#[macro_export]
macro_rules! frazil_debug_assert_eq {
    ($left:expr, $right:expr $(,)?) => (
        if cfg!(debug_assertions) && $left != $right {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($left), " != ", stringify!($right))));
        }
    );
    ($left:expr, $right:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(debug_assertions) && $left != $right  {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($left), " != ", stringify!($right), ", ", $format), $($($args)*)?));
        }
    );
}
pub use frazil_debug_assert_eq;

/// A `debug_assert_ne!()` analogue that prints the error with line number information
/// instead of panicking.
#[macro_export]
macro_rules! frazil_debug_assert_ne {
    ($left:expr, $right:expr $(,)?) => (
        if cfg!(debug_assertions) && $left == $right {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($left), " == ", stringify!($right))));
        }
    );
    ($left:expr, $right:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(debug_assertions) && $left == $right  {
            $crate::util::permit_alloc(|| $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($left), " == ", stringify!($right), ", ", $format), $($($args)*)?));
        }
    );
}
pub use frazil_debug_assert_ne;
