pub mod fakes;
pub mod traits;
pub mod types;

pub use traits::*;
pub use types::*;
