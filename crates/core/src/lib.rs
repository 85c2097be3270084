#![forbid(unsafe_code)]

pub mod model;
pub mod monitor;
pub mod security;
pub mod state;
pub mod time;
pub mod timer;

pub use time::Clock;
