use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// The declarative description of one service deployment.
///
/// Immutable once loaded; the config loader assembles it from a TOML file,
/// environment overrides and CLI flags, then calls [`ServiceSpec::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Container name. Defaults to the last path segment of `image`.
    #[serde(default)]
    pub name: String,

    /// Image reference without the tag, e.g. `myapp` or `acme/myapp`.
    #[serde(default)]
    pub image: String,

    #[serde(default = "default_tag")]
    pub tag: String,

    /// Port mappings in `HOST:CONTAINER` form.
    #[serde(default)]
    pub ports: Vec<PortMapping>,

    /// Environment file passed to the engine via `--env-file`.
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    /// Volume mounts in `NAME:/path` form.
    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Registry prefix for tag/push, e.g. `registry.example.com/team`.
    /// When absent, tag and push are skipped.
    #[serde(default)]
    pub registry: Option<String>,

    /// Push the tagged image after building. Ignored without a registry.
    #[serde(default = "default_push")]
    pub push: bool,

    /// Build instructions. When absent, deploy pulls the image instead.
    #[serde(default)]
    pub build: Option<BuildSpec>,

    #[serde(default)]
    pub health: HealthSpec,
}

impl ServiceSpec {
    /// The local image reference, `image:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// The registry-qualified reference used for tag and push, if any.
    pub fn registry_ref(&self) -> Option<String> {
        self.registry
            .as_ref()
            .map(|registry| format!("{}/{}:{}", registry.trim_end_matches('/'), self.image, self.tag))
    }

    /// Checks required fields. The loader calls this after merging sources.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(Error::Config("missing field: image".into()));
        }
        if self.name.is_empty() {
            return Err(Error::Config("missing field: name".into()));
        }
        if self.tag.is_empty() {
            return Err(Error::Config("tag must not be empty".into()));
        }
        for volume in &self.volumes {
            if !volume.contains(':') {
                return Err(Error::Config(format!(
                    "volume '{}' must be NAME:/container/path",
                    volume
                )));
            }
        }
        Ok(())
    }
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_push() -> bool {
    true
}

/// One published port, `HOST:CONTAINER`.
///
/// Serialized as the string form so spec files read the way the engine CLI
/// writes them: `ports = ["3000:3000"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl FromStr for PortMapping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| -> Result<u16> {
            let port: u16 = part
                .parse()
                .map_err(|_| Error::Config(format!("invalid port mapping '{}'", s)))?;
            if port == 0 {
                return Err(Error::Config(format!("port 0 is not mappable in '{}'", s)));
            }
            Ok(port)
        };

        match s.split_once(':') {
            Some((host, container)) => Ok(Self {
                host: parse(host)?,
                container: parse(container)?,
            }),
            // A bare port maps to itself, like the engine's shorthand.
            None => {
                let port = parse(s)?;
                Ok(Self {
                    host: port,
                    container: port,
                })
            }
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl TryFrom<String> for PortMapping {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PortMapping> for String {
    fn from(value: PortMapping) -> Self {
        value.to_string()
    }
}

/// Engine restart policy for the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    UnlessStopped,
    OnFailure,
    #[default]
    No,
}

impl RestartPolicy {
    /// The value the engine expects after `--restart`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::UnlessStopped => "unless-stopped",
            Self::OnFailure => "on-failure",
            Self::No => "no",
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(Self::Always),
            "unless-stopped" => Ok(Self::UnlessStopped),
            "on-failure" => Ok(Self::OnFailure),
            "no" => Ok(Self::No),
            other => Err(Error::Config(format!(
                "unknown restart policy '{}' (expected always, unless-stopped, on-failure or no)",
                other
            ))),
        }
    }
}

/// How to build the image locally before tagging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory.
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Dockerfile path, when not `<context>/Dockerfile`.
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,

    /// Build arguments in `KEY=VALUE` form.
    #[serde(default)]
    pub build_args: Vec<String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

/// Health probing and retry parameters for the deploy pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSpec {
    /// Path probed on the service, joined to the probe port.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Host port to probe. Defaults to the first port mapping's host side.
    #[serde(default)]
    pub port: Option<u16>,

    /// Seconds to wait after `run` before the first probe.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Seconds between successful-path probes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-attempt probe timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Consecutive probe failures tolerated before teardown.
    #[serde(default = "default_failure_budget")]
    pub failure_budget: u32,

    /// `run` retries after the initial attempt before giving up.
    #[serde(default = "default_run_retries")]
    pub run_retries: u32,
}

impl HealthSpec {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The URL to probe, or `None` when the spec exposes nothing to probe.
    pub fn url(&self, spec: &ServiceSpec) -> Option<String> {
        let port = self.port.or_else(|| spec.ports.first().map(|p| p.host))?;
        let endpoint = if self.endpoint.starts_with('/') {
            self.endpoint.clone()
        } else {
            format!("/{}", self.endpoint)
        };
        Some(format!("http://127.0.0.1:{}{}", port, endpoint))
    }
}

impl Default for HealthSpec {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            port: None,
            grace_secs: default_grace_secs(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            failure_budget: default_failure_budget(),
            run_retries: default_run_retries(),
        }
    }
}

fn default_endpoint() -> String {
    "/health".to_string()
}

fn default_grace_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_failure_budget() -> u32 {
    3
}

fn default_run_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(image: &str, name: &str) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            image: image.to_string(),
            tag: "v1.0.0".to_string(),
            ports: vec![],
            env_file: None,
            volumes: vec![],
            restart_policy: RestartPolicy::No,
            registry: None,
            push: true,
            build: None,
            health: HealthSpec::default(),
        }
    }

    #[test]
    fn port_mapping_parses_pairs_and_shorthand() {
        let mapping: PortMapping = "3000:8080".parse().unwrap();
        assert_eq!(mapping.host, 3000);
        assert_eq!(mapping.container, 8080);

        let shorthand: PortMapping = "9090".parse().unwrap();
        assert_eq!(shorthand.host, 9090);
        assert_eq!(shorthand.container, 9090);

        assert_eq!(mapping.to_string(), "3000:8080");
    }

    #[test]
    fn port_mapping_rejects_garbage() {
        assert!("abc:80".parse::<PortMapping>().is_err());
        assert!("0:80".parse::<PortMapping>().is_err());
        assert!("".parse::<PortMapping>().is_err());
    }

    #[test]
    fn restart_policy_flags_round_trip() {
        for raw in ["always", "unless-stopped", "on-failure", "no"] {
            let policy: RestartPolicy = raw.parse().unwrap();
            assert_eq!(policy.as_flag(), raw);
        }
        assert!("sometimes".parse::<RestartPolicy>().is_err());
    }

    #[test]
    fn image_ref_and_registry_ref() {
        let mut s = spec("myapp", "web");
        assert_eq!(s.image_ref(), "myapp:v1.0.0");
        assert_eq!(s.registry_ref(), None);

        s.registry = Some("registry.example.com/team/".to_string());
        assert_eq!(
            s.registry_ref().unwrap(),
            "registry.example.com/team/myapp:v1.0.0"
        );
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let err = spec("", "web").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = spec("myapp", "").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut s = spec("myapp", "web");
        s.volumes.push("data".to_string());
        assert!(s.validate().is_err());

        s.volumes = vec!["data:/var/lib/data".to_string()];
        assert!(s.validate().is_ok());
    }

    #[test]
    fn health_defaults_match_the_documented_values() {
        let health = HealthSpec::default();
        assert_eq!(health.grace(), Duration::from_secs(10));
        assert_eq!(health.interval(), Duration::from_secs(30));
        assert_eq!(health.timeout(), Duration::from_secs(3));
        assert_eq!(health.failure_budget, 3);
        assert_eq!(health.run_retries, 3);
        assert_eq!(health.endpoint, "/health");
    }

    #[test]
    fn probe_url_uses_first_port_mapping() {
        let mut s = spec("myapp", "web");
        assert_eq!(s.health.url(&s), None);

        s.ports.push("3000:3000".parse().unwrap());
        assert_eq!(s.health.url(&s).unwrap(), "http://127.0.0.1:3000/health");

        s.health.port = Some(4000);
        s.health.endpoint = "status".to_string();
        assert_eq!(s.health.url(&s).unwrap(), "http://127.0.0.1:4000/status");
    }
}
