mod arch;

pub use arch::*;
