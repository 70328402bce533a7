//! HTTP request handlers organized by domain

pub mod export;
pub mod health;
pub mod quota;
pub mod reconcile;

// Re-export all handlers for use in router
pub use export::*;
pub use health::*;
pub use quota::*;
pub use reconcile::*;
