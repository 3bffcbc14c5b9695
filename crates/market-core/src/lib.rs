pub mod error;
pub mod key;
pub mod traits;
pub mod types;

pub use error::*;
pub use key::*;
pub use traits::*;
pub use types::*;
