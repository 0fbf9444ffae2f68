//! Services for talking to the outside world.
pub mod store;
