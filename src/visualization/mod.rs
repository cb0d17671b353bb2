pub mod console;
pub mod diagnostics;

pub use console::*;
pub use diagnostics::*;
