use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use stevedore_core::{
    ContainerHandle, EngineErrorKind, Error, LifecycleState, Result, ServiceSpec,
};

use super::{Engine, InspectReport};

/// Drives a docker-compatible engine binary through its CLI.
///
/// The binary name is configurable so podman-style replacements work
/// unchanged. Output is captured, not inherited: stdout carries results
/// (ids, log text), stderr becomes the error message on failure.
pub struct DockerEngine {
    binary: String,
}

impl DockerEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs one engine subcommand and returns trimmed stdout.
    async fn exec(&self, kind: EngineErrorKind, args: &[String]) -> Result<String> {
        debug!("Engine: {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                Error::engine(
                    EngineErrorKind::Spawn,
                    format!("failed to invoke '{}': {}", self.binary, e),
                )
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let kind = if is_not_found(&stderr) {
            EngineErrorKind::NotFound
        } else {
            kind
        };
        Err(Error::engine(kind, stderr))
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn build(&self, spec: &ServiceSpec) -> Result<()> {
        info!("Engine: building {}", spec.image_ref());
        self.exec(EngineErrorKind::BuildFailed, &build_args(spec))
            .await?;
        Ok(())
    }

    async fn tag(&self, image: &str, alias: &str) -> Result<()> {
        self.exec(
            EngineErrorKind::TagFailed,
            &["tag".to_string(), image.to_string(), alias.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<()> {
        info!("Engine: pushing {}", image);
        self.exec(
            EngineErrorKind::PushFailed,
            &["push".to_string(), image.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<()> {
        info!("Engine: pulling {}", image);
        self.exec(
            EngineErrorKind::PullFailed,
            &["pull".to_string(), image.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn run(&self, spec: &ServiceSpec) -> Result<ContainerHandle> {
        let id = self
            .exec(EngineErrorKind::RunFailed, &run_args(spec))
            .await?;
        info!("Engine: started '{}' ({})", spec.name, short_id(&id));
        Ok(ContainerHandle {
            name: spec.name.clone(),
            id: Some(id),
            state: LifecycleState::Running,
        })
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        self.exec(
            EngineErrorKind::StopFailed,
            &["stop".to_string(), handle.name.clone()],
        )
        .await?;
        Ok(())
    }

    async fn rm(&self, handle: &ContainerHandle) -> Result<()> {
        self.exec(
            EngineErrorKind::RemoveFailed,
            &["rm".to_string(), handle.name.clone()],
        )
        .await?;
        Ok(())
    }

    async fn logs(&self, name: &str, tail: Option<usize>) -> Result<String> {
        let mut args = vec!["logs".to_string()];
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        args.push(name.to_string());
        self.exec(EngineErrorKind::LogsFailed, &args).await
    }

    async fn inspect(&self, name: &str) -> Result<Option<InspectReport>> {
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}|{{.State.Status}}".to_string(),
            name.to_string(),
        ];
        match self.exec(EngineErrorKind::InspectFailed, &args).await {
            Ok(line) => match line.split_once('|') {
                Some((id, status)) => Ok(Some(InspectReport {
                    id: id.to_string(),
                    status: status.to_string(),
                })),
                None => Err(Error::engine(
                    EngineErrorKind::InspectFailed,
                    format!("unexpected inspect output: '{}'", line),
                )),
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Engine phrasing for a missing container/image/object.
fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container")
        || lower.contains("no such object")
        || lower.contains("no such image")
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Assembles `build` arguments. Pure so it is testable without an engine.
fn build_args(spec: &ServiceSpec) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-t".to_string(), spec.image_ref()];
    if let Some(build) = &spec.build {
        if let Some(dockerfile) = &build.dockerfile {
            args.push("-f".to_string());
            args.push(dockerfile.to_string_lossy().to_string());
        }
        for build_arg in &build.build_args {
            args.push("--build-arg".to_string());
            args.push(build_arg.clone());
        }
        args.push(build.context.to_string_lossy().to_string());
    } else {
        args.push(".".to_string());
    }
    args
}

/// Assembles `run` arguments for a detached, named container.
fn run_args(spec: &ServiceSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--restart".to_string(),
        spec.restart_policy.as_flag().to_string(),
    ];
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(env_file) = &spec.env_file {
        args.push("--env-file".to_string());
        args.push(env_file.to_string_lossy().to_string());
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    args.push(spec.image_ref());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use stevedore_core::{BuildSpec, HealthSpec, RestartPolicy};

    fn spec() -> ServiceSpec {
        ServiceSpec {
            name: "web".to_string(),
            image: "myapp".to_string(),
            tag: "v1.0.0".to_string(),
            ports: vec!["3000:3000".parse().unwrap()],
            env_file: Some(PathBuf::from(".env")),
            volumes: vec!["data:/var/lib/data".to_string()],
            restart_policy: RestartPolicy::UnlessStopped,
            registry: None,
            push: true,
            build: None,
            health: HealthSpec::default(),
        }
    }

    #[test]
    fn run_args_cover_the_whole_spec() {
        let args = run_args(&spec());
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "web",
                "--restart",
                "unless-stopped",
                "-p",
                "3000:3000",
                "--env-file",
                ".env",
                "-v",
                "data:/var/lib/data",
                "myapp:v1.0.0",
            ]
        );
    }

    #[test]
    fn build_args_default_to_cwd_context() {
        let args = build_args(&spec());
        assert_eq!(args, vec!["build", "-t", "myapp:v1.0.0", "."]);
    }

    #[test]
    fn build_args_include_dockerfile_and_build_args() {
        let mut s = spec();
        s.build = Some(BuildSpec {
            context: PathBuf::from("srv"),
            dockerfile: Some(PathBuf::from("srv/Dockerfile.prod")),
            build_args: vec!["MODE=release".to_string()],
        });
        let args = build_args(&s);
        assert_eq!(
            args,
            vec![
                "build",
                "-t",
                "myapp:v1.0.0",
                "-f",
                "srv/Dockerfile.prod",
                "--build-arg",
                "MODE=release",
                "srv",
            ]
        );
    }

    #[test]
    fn missing_container_phrases_are_recognized() {
        assert!(is_not_found("Error: No such container: web"));
        assert!(is_not_found("Error: No such object: web"));
        assert!(!is_not_found("Error: port is already allocated"));
    }
}
