//! Model resolution and metadata extraction.
//!
//! Resolves a `namespace/name` model identifier to a usable GGUF artifact
//! on local disk, querying a remote registry and performing a validated
//! download when the artifact is absent, and reads structural metadata out
//! of the GGUF container to drive size and quantization decisions.

pub mod capability;
pub mod config;
pub mod download;
pub mod gguf;
pub mod manager;
pub mod registry;
pub mod resolver;

pub use capability::{Capability, PlatformProbe, SystemProbe};
pub use config::Settings;
pub use gguf::ModelFileInfo;
pub use manager::{DownloadPlan, LocalModel, ModelError, ModelManager, ModelStatus};
pub use resolver::{ModelIdentifier, ResolvedLocation};
