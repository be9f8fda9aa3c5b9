#[macro_use]
pub mod debug;

/// Everything you'd need to wrap a kernel. Import this with `use frazil::prelude::*;`.
pub mod prelude;

// Re-exported because the `frazil_log!()` family of macros expand to calls into the log
// crate.
pub use log;

pub mod buffer;
pub mod event;
pub mod event_stream;
pub mod ffi;
pub mod kernel;
pub mod params;
pub mod util;
pub mod wrapper;
