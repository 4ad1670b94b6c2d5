pub mod core;
pub mod dashboard;
pub mod events;
pub mod stats;
