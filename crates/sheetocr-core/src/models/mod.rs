//! Data models: region instructions and configuration.

pub mod config;
pub mod region;

pub use config::SheetOcrConfig;
pub use region::{ConfigRow, EntityJobSet, JobSlot, Rect, RegionJob};
