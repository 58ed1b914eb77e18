pub mod board;
pub mod client;
pub mod config;
pub mod dto;
pub mod engine;
pub mod error;
pub mod models;
pub mod realtime;
pub mod repositories;
pub mod telemetry;
pub mod usecases;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
