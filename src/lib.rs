//! Offline-capable caching interception layer for the MarketWatch web app.

pub mod cache;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod control;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod strategy;
pub mod tasks;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use worker::{ActivationReport, ServiceWorker};
