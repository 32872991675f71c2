mod dates;
mod ledger;
mod money;
mod movement;
mod reconciliation;

pub use dates::*;
pub use ledger::*;
pub use money::*;
pub use movement::*;
pub use reconciliation::*;
