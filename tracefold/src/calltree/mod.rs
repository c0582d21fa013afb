mod inner;
pub mod traits;

pub use inner::{CallPathFrame, CallPathTree};
