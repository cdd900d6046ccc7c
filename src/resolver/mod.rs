use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Settings;

/// Extension recognized as a model artifact.
pub const MODEL_EXTENSION: &str = "gguf";

/// Namespace used when an identifier carries no `namespace/` prefix.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A `namespace/name` model identifier, mirroring the remote registry's own
/// naming. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentifier {
    pub namespace: String,
    pub name: String,
}

impl ModelIdentifier {
    /// Splits at the first `/`; everything after it, slashes included,
    /// belongs to the name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((namespace, name)) => Self {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            None => Self {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: raw.to_string(),
            },
        }
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Canonical on-disk location for a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocation {
    /// A per-model config override. Points at a single file, which may or
    /// may not exist yet.
    File(PathBuf),
    /// The standard layout: `matched_file` is set when a recognized
    /// artifact already exists under `dir`.
    Directory {
        dir: PathBuf,
        matched_file: Option<PathBuf>,
    },
}

impl ResolvedLocation {
    /// Path of an artifact that already exists locally, if any.
    pub fn existing_artifact(&self) -> Option<PathBuf> {
        match self {
            ResolvedLocation::File(path) if path.exists() => Some(path.clone()),
            ResolvedLocation::Directory { matched_file, .. } => matched_file.clone(),
            _ => None,
        }
    }
}

/// Resolves the canonical location for `id`, reading the
/// AGENTYARD_MODELS_PATH environment override.
pub fn resolve(id: &ModelIdentifier, settings: &Settings) -> ResolvedLocation {
    let env_dir = std::env::var_os("AGENTYARD_MODELS_PATH").map(PathBuf::from);
    resolve_with_env(id, settings, env_dir)
}

/// Pure resolution over explicit inputs. Precedence, first match wins:
/// per-model config override, environment override, configured models_dir,
/// then `<home>/agentyard/models`. The final directory is always
/// `base/namespace/name`. No directories are created here.
pub fn resolve_with_env(
    id: &ModelIdentifier,
    settings: &Settings,
    env_models_dir: Option<PathBuf>,
) -> ResolvedLocation {
    if let Some(override_entry) = override_for(id, settings) {
        return ResolvedLocation::File(override_entry.path.clone());
    }

    let base = env_models_dir
        .or_else(|| settings.models_dir.clone())
        .or_else(|| dirs::home_dir().map(|h| h.join("agentyard").join("models")))
        .unwrap_or_else(|| PathBuf::from("agentyard/models"));

    let dir = base.join(&id.namespace).join(&id.name);
    let matched_file = find_existing_artifact(&dir);
    ResolvedLocation::Directory { dir, matched_file }
}

/// Per-model override lookup. Config keys are whatever string the user
/// typed, so a bare identifier is looked up both as `default/name` and as
/// the bare `name`.
fn override_for<'a>(
    id: &ModelIdentifier,
    settings: &'a Settings,
) -> Option<&'a crate::config::ModelOverride> {
    if let Some(entry) = settings.models.get(&id.to_string()) {
        return Some(entry);
    }
    if id.namespace == DEFAULT_NAMESPACE {
        return settings.models.get(&id.name);
    }
    None
}

/// First `.gguf` file under `dir` in lexical filename order, or None.
/// Lexical order makes the multi-candidate case deterministic.
pub fn find_existing_artifact(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(MODEL_EXTENSION))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
