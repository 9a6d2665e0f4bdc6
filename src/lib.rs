pub mod asset;
pub mod config;
pub mod errors;
pub mod export;
pub mod forge_config;
pub mod init;
pub mod lineage;
pub mod orchestrator;
pub mod phase;
pub mod pixel;
pub mod storage;
pub mod synthesis;
pub mod ui;
pub mod workflow;

pub use errors::ForgeError;
pub use orchestrator::ForgeOrchestrator;
