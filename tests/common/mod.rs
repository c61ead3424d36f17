pub mod fixtures;
pub mod testing;

pub use fixtures::*;
pub use testing::*;
