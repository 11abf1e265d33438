pub mod analysis;
pub mod config;
pub mod events;
pub mod features;
pub mod health;
