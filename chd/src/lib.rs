#![doc = include_str!("../README.md")]

pub mod utils;
pub use utils::{is_prime, uniq};

pub mod stats;

pub mod hash;
pub use hash::Lanes;

mod displacements;
pub use displacements::Displacements;

mod function;
pub use function::{BuildConf, Function};

pub use dyn_size_of::GetSize;
