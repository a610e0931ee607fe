pub mod coordinator;
pub mod dlq;
pub mod domain;
pub mod engine;
pub mod ingestion;
pub mod lifecycle;
pub mod matcher;
pub mod notifier;
pub mod replay;
pub mod repository;
pub mod settings;
pub mod settlement;

#[cfg(test)]
mod testing;

pub use engine::{Engine, HistoryFilter};
pub use settings::Settings;
