pub mod check;
pub mod proxy;

pub use check::*;
pub use proxy::*;
