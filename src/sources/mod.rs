//! Sources of position data.
pub mod fake;
pub mod gps;
pub mod gpsd;
