pub mod client;
pub mod topics;

pub use client::ChatEngine;
