pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod state;
pub mod ui;
