//! Command implementations

mod check;
mod reconcile;
mod serve;

pub use check::cmd_check;
pub use reconcile::cmd_reconcile;
pub use serve::cmd_serve;
