pub mod calltree;
pub mod dto;
pub mod error;
pub mod stats;

/// Opaque key into the external region/function definition table.
pub type FunctionId = u32;

/// An execution context being traced (a process or a thread). Each
/// location produces its own ordered event stream.
pub type LocationId = u64;

/// Externally defined performance counter id.
pub type MetricId = u32;

pub use calltree::{CallPathFrame, CallPathTree};
pub use calltree::traits::Mergeable;
pub use dto::TreeDto;
pub use error::{DtoError, MergeError};
