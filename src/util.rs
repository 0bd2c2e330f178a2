mod bit_set;
mod offset_vec;

pub use bit_set::*;
pub use offset_vec::*;
