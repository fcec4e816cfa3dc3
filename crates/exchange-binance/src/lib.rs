pub mod client;
pub mod gateway;
pub mod models;
pub mod signing;

pub use client::BinanceClient;
pub use gateway::BinanceGateway;
pub use signing::ApiCredentials;
