pub mod axis;
pub mod bench;
pub mod chart;
pub mod config;
pub mod plot;
pub mod result;
pub mod sweep;
pub mod util;
