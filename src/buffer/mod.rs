mod frame;
mod pool;

pub use frame::*;
pub use pool::*;
