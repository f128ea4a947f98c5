pub mod client;
pub mod config;
pub mod engine;
pub mod health;
pub mod sweeper;
pub mod utils;
pub mod wallet;
