pub mod export;
pub mod import;
pub mod mapping;

pub use export::*;
pub use import::*;
pub use mapping::*;
