//! # Client
//!
//! Remote store access, the pipeline orchestrator and the interactive menu.

pub mod menu;
pub mod orchestrator;
pub mod store_client;

pub use menu::{Menu, MenuChoice};
pub use orchestrator::{OrchestrationMode, Orchestrator, PipelineStage, RunOutcome};
pub use store_client::{find_blob, Deposit, FetchedBlob, HttpStoreClient, RemoteStore};
