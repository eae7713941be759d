//! Services - business logic and state management
//!
//! - `coordinator` - single event loop owning all mutable state
//! - `proximity` - which entrances a sample has arrived at
//! - `cooldown` - per-entrance alert suppression window
//! - `formatter` - alert title/body rendering
//! - `dispatcher` - delivery and cooldown bookkeeping
//! - `throttle` - distance/time filter on location samples

pub mod cooldown;
pub mod coordinator;
pub mod dispatcher;
pub mod formatter;
pub mod proximity;
pub mod throttle;

// Re-export commonly used types
pub use coordinator::Coordinator;
pub use dispatcher::{AlertDispatcher, Dispatched};
