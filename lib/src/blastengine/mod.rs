//! Client for the BlastEngine delivery API.
pub mod api;
mod client;

pub use client::BlastEngineClient;
