// Application layer - use cases over the movement snapshot store.
// The domain layer stays synchronous and pure; everything that touches
// storage goes through `LedgerService`.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
