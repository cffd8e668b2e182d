pub mod config;
pub mod threads;
