pub mod client;
pub mod stages;

pub use client::ChatClient;
