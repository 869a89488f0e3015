//! The two weekly workflows the engine drives.

pub mod lunchtime;
pub mod saturday;

pub use lunchtime::LunchtimeDisco;
pub use saturday::SaturdayDisco;
