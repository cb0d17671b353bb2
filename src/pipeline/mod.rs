pub mod batch;
pub mod engine;
pub mod traits;
pub mod types;

pub use batch::*;
pub use engine::*;
pub use traits::*;
pub use types::*;
