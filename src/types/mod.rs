pub mod bps;
pub mod ids;
pub mod price;
pub mod timestamp;
