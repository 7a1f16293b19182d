//! Layered spec loading: serde defaults, then the TOML spec file, then
//! `STEVEDORE_*` environment variables, then CLI flags (flags win).
//!
//! A minimal spec file:
//!
//! ```toml
//! name = "web"
//! image = "myapp"
//! tag = "v1.0.0"
//! ports = ["3000:3000"]
//! restart_policy = "unless-stopped"
//!
//! [build]
//! context = "."
//!
//! [health]
//! endpoint = "/health"
//! ```

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

use stevedore_core::{Error, PortMapping, RestartPolicy, Result, ServiceSpec};

/// Process-level knobs that are not part of the service spec.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Engine binary to drive, e.g. `docker` or `podman`.
    pub engine: String,
    /// Location of the state tracker file.
    pub state_file: PathBuf,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            state_file: default_state_file(),
        }
    }
}

/// `$STEVEDORE_STATE_FILE`, else `$HOME/.local/state/stevedore/state.json`,
/// else the system temp dir.
pub fn default_state_file() -> PathBuf {
    if let Some(path) = std::env::var_os("STEVEDORE_STATE_FILE") {
        return PathBuf::from(path);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".local/state/stevedore/state.json")
}

/// CLI-flag values layered on top of the file/environment spec.
#[derive(Debug, Clone, Default)]
pub struct SpecOverrides {
    pub name: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
    pub ports: Vec<PortMapping>,
    pub env_file: Option<PathBuf>,
    pub volumes: Vec<String>,
    pub restart_policy: Option<RestartPolicy>,
    pub registry: Option<String>,
    pub no_push: bool,
}

impl SpecOverrides {
    fn apply(&self, spec: &mut ServiceSpec) {
        if let Some(name) = &self.name {
            spec.name = name.clone();
        }
        if let Some(image) = &self.image {
            spec.image = image.clone();
        }
        if let Some(tag) = &self.tag {
            spec.tag = tag.clone();
        }
        if !self.ports.is_empty() {
            spec.ports = self.ports.clone();
        }
        if let Some(env_file) = &self.env_file {
            spec.env_file = Some(env_file.clone());
        }
        if !self.volumes.is_empty() {
            spec.volumes = self.volumes.clone();
        }
        if let Some(policy) = self.restart_policy {
            spec.restart_policy = policy;
        }
        if let Some(registry) = &self.registry {
            spec.registry = Some(registry.clone());
        }
        if self.no_push {
            spec.push = false;
        }
    }
}

/// Loads and validates a [`ServiceSpec`].
///
/// `file` is optional so purely flag-driven invocations work; when given it
/// must exist.
pub fn load_spec(file: Option<&Path>, overrides: &SpecOverrides) -> Result<ServiceSpec> {
    let mut builder = Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path));
    }
    builder = builder.add_source(Environment::with_prefix("STEVEDORE").separator("__"));

    let merged = builder
        .build()
        .map_err(|e| Error::Config(e.to_string()))?;
    let mut spec: ServiceSpec = merged
        .try_deserialize()
        .map_err(|e| Error::Config(e.to_string()))?;

    overrides.apply(&mut spec);

    if spec.name.is_empty() {
        spec.name = default_name(&spec.image);
    }

    spec.validate()?;

    // The engine would reject a dangling --env-file anyway; catching it here
    // keeps it in the ConfigError class, which is never retried.
    if let Some(env_file) = &spec.env_file {
        if !env_file.exists() {
            return Err(Error::Config(format!(
                "env_file {:?} does not exist",
                env_file
            )));
        }
    }

    Ok(spec)
}

/// Container name derived from the image: its last path segment.
fn default_name(image: &str) -> String {
    image.rsplit('/').next().unwrap_or(image).to_string()
}
