use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::capability::{self, Capability, PlatformProbe};
use crate::config::Settings;
use crate::download::{self, DownloadError};
use crate::registry::{FileVariant, RegistryClient};
use crate::resolver::{self, ModelIdentifier, ResolvedLocation};

/// Failures surfaced to callers. Registry and cache problems never appear
/// here; they degrade to absence inside the registry client, and absence
/// becomes `NotFound`.
#[derive(Debug)]
pub enum ModelError {
    /// The identifier resolves to nothing locally and nothing in the
    /// registry (including registry-unreachable situations).
    NotFound(String),
    Download(DownloadError),
    Io(std::io::Error),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::NotFound(msg) => write!(f, "model not found: {}", msg),
            ModelError::Download(e) => write!(f, "download failed: {}", e),
            ModelError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for ModelError {}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Io(err)
    }
}

impl From<DownloadError> for ModelError {
    fn from(err: DownloadError) -> Self {
        ModelError::Download(err)
    }
}

/// What a download would do, produced by `ModelManager::status` so callers
/// can confirm (or size-check) before committing to the transfer.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub identifier: ModelIdentifier,
    pub variant: FileVariant,
    pub capability: Capability,
    pub destination: PathBuf,
}

/// Outcome of checking a model identifier against local disk and the
/// registry.
#[derive(Debug, Clone)]
pub enum ModelStatus {
    /// A recognized artifact already exists; no network was touched.
    Present(PathBuf),
    NeedsDownload(DownloadPlan),
}

/// A locally installed model discovered under the models directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModel {
    pub identifier: ModelIdentifier,
    pub path: PathBuf,
}

/// Ties resolution, registry lookup, variant selection and download into
/// the one flow external callers drive.
pub struct ModelManager {
    settings: Settings,
    registry: RegistryClient,
}

impl ModelManager {
    pub fn new(settings: Settings) -> Self {
        let registry = RegistryClient::new(&settings);
        Self { settings, registry }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Canonical location for an identifier; pure, no network.
    pub fn resolve(&self, raw: &str) -> (ModelIdentifier, ResolvedLocation) {
        let id = ModelIdentifier::parse(raw);
        let location = resolver::resolve(&id, &self.settings);
        (id, location)
    }

    /// Fast path first: if an artifact already exists at the resolved
    /// location it is returned without touching the network. Otherwise the
    /// registry is consulted and a download plan is produced.
    pub async fn status(
        &self,
        raw: &str,
        probe: &dyn PlatformProbe,
    ) -> Result<ModelStatus, ModelError> {
        let (id, location) = self.resolve(raw);

        if let Some(path) = location.existing_artifact() {
            debug!("model {} already present at {}", id, path.display());
            return Ok(ModelStatus::Present(path));
        }

        info!("model {} not found locally, querying registry", id);
        let entry = self
            .registry
            .find_model(&id)
            .await
            .ok_or_else(|| ModelError::NotFound(format!("{} is not in the registry", id)))?;

        let variants = self.registry.list_variants(&entry).await;
        if variants.is_empty() {
            return Err(ModelError::NotFound(format!(
                "{} has no gguf files available",
                entry.id
            )));
        }

        let cap = capability::classify(probe);
        let variant = capability::recommend(&variants, cap)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(format!("{} has no usable variant", entry.id)))?;

        let destination = match location {
            // Legacy single-file override: download straight to that path.
            ResolvedLocation::File(path) => path,
            ResolvedLocation::Directory { dir, .. } => dir.join(&variant.filename),
        };

        Ok(ModelStatus::NeedsDownload(DownloadPlan {
            identifier: id,
            variant,
            capability: cap,
            destination,
        }))
    }

    /// Executes a plan produced by `status`.
    pub async fn download(
        &self,
        plan: &DownloadPlan,
        show_progress: bool,
    ) -> Result<PathBuf, ModelError> {
        download::fetch(&plan.variant.download_url, &plan.destination, show_progress).await?;
        Ok(plan.destination.clone())
    }

    /// Resolves and, if necessary, downloads a model without asking.
    /// Interactive callers should go through `status` to confirm first.
    pub async fn ensure_model(
        &self,
        raw: &str,
        probe: &dyn PlatformProbe,
        show_progress: bool,
    ) -> Result<PathBuf, ModelError> {
        match self.status(raw, probe).await? {
            ModelStatus::Present(path) => Ok(path),
            ModelStatus::NeedsDownload(plan) => self.download(&plan, show_progress).await,
        }
    }

    /// Scans the models directory for installed artifacts, walking the
    /// `namespace/name` layout. Unreadable directories are skipped.
    pub fn list_local(&self) -> Vec<LocalModel> {
        let base = std::env::var_os("AGENTYARD_MODELS_PATH")
            .map(PathBuf::from)
            .or_else(|| self.settings.models_dir.clone())
            .or_else(|| dirs::home_dir().map(|h| h.join("agentyard").join("models")));
        let base = match base {
            Some(base) => base,
            None => return Vec::new(),
        };

        let mut models = Vec::new();
        for namespace in read_subdirs(&base) {
            for name in read_subdirs(&namespace) {
                if let Some(path) = resolver::find_existing_artifact(&name) {
                    models.push(LocalModel {
                        identifier: ModelIdentifier {
                            namespace: dir_name(&namespace),
                            name: dir_name(&name),
                        },
                        path,
                    });
                }
            }
        }
        models.sort_by(|a, b| a.identifier.to_string().cmp(&b.identifier.to_string()));
        models
    }
}

fn read_subdirs(dir: &std::path::Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default()
}

fn dir_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
