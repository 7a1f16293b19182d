use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;

mod args;

use args::{Cli, Commands};
use stevedore_core::{EngineErrorKind, Error, ServiceSpec};
use stevedore_orchestrator::config::{self, RuntimeSettings, SpecOverrides};
use stevedore_orchestrator::health::HttpProber;
use stevedore_orchestrator::lifecycle::Orchestrator;
use stevedore_orchestrator::runtime::DockerEngine;
use stevedore_orchestrator::state::StateTracker;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = settings(&cli);

    match cli.command {
        Commands::Deploy {
            file,
            name,
            image,
            tag,
            ports,
            env_file,
            volumes,
            restart,
            registry,
            no_push,
        } => {
            let overrides = SpecOverrides {
                name,
                image,
                tag,
                ports,
                env_file,
                volumes,
                restart_policy: restart,
                registry,
                no_push,
            };
            let spec = config::load_spec(file.as_deref(), &overrides)?;
            deploy(&settings, &spec).await
        }
        Commands::Stop { name } => {
            orchestrator(&settings)?.teardown(&name).await?;
            info!("'{}' stopped and removed", name);
            Ok(())
        }
        Commands::Status { name } => status(&settings, name).await,
        Commands::Logs { name, tail } => {
            let text = orchestrator(&settings)?.logs(&name, tail).await?;
            println!("{}", text);
            Ok(())
        }
    }
}

fn settings(cli: &Cli) -> RuntimeSettings {
    let mut settings = RuntimeSettings {
        engine: cli.engine.clone(),
        ..RuntimeSettings::default()
    };
    if let Some(path) = &cli.state_file {
        settings.state_file = path.clone();
    }
    settings
}

fn orchestrator(settings: &RuntimeSettings) -> Result<Orchestrator<DockerEngine, HttpProber>> {
    let tracker = StateTracker::open(settings.state_file.clone())
        .with_context(|| format!("opening state file {:?}", settings.state_file))?;
    Ok(Orchestrator::new(
        DockerEngine::new(&settings.engine),
        HttpProber::new(),
        tracker,
    ))
}

async fn deploy(settings: &RuntimeSettings, spec: &ServiceSpec) -> Result<()> {
    let mut orch = orchestrator(settings)?;

    tokio::select! {
        outcome = orch.deploy(spec) => {
            let handle = outcome?;
            info!(
                "'{}' is {} ({})",
                spec.name,
                handle.state,
                handle.id.as_deref().unwrap_or("no id")
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted. Tearing '{}' down...", spec.name);
            // The pipeline future is dropped at this point. Every completed
            // step is already persisted, so a fresh tracker sees whatever
            // the pipeline managed to start.
            let mut cleanup = orchestrator(settings)?;
            cleanup.teardown(&spec.name).await?;
            std::process::exit(130);
        }
    }
}

async fn status(settings: &RuntimeSettings, name: Option<String>) -> Result<()> {
    let mut orch = orchestrator(settings)?;

    match name {
        Some(name) => {
            let state = orch.status(&name).await?;
            println!("{}: {}", name, state);
        }
        None => {
            let tracked: Vec<(String, String)> = orch
                .tracker()
                .all()
                .iter()
                .map(|record| (record.name.clone(), record.image.clone()))
                .collect();

            println!("{:<20} | {:<10} | {:<32}", "NAME", "STATE", "IMAGE");
            println!("{:-<20}-+-{:-<10}-+-{:-<32}", "", "", "");
            for (name, image) in tracked {
                let state = orch.status(&name).await?;
                println!("{:<20} | {:<10} | {:<32}", name, state, image);
            }
        }
    }
    Ok(())
}

/// Maps the error taxonomy to process exit codes:
/// 1 generic, 2 config, 3-11 per engine operation, 12 health check.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::Config(_)) => 2,
        Some(Error::Engine { kind, .. }) => match kind {
            EngineErrorKind::BuildFailed => 3,
            EngineErrorKind::TagFailed => 4,
            EngineErrorKind::PushFailed => 5,
            EngineErrorKind::PullFailed => 6,
            EngineErrorKind::RunFailed => 7,
            EngineErrorKind::StopFailed | EngineErrorKind::RemoveFailed => 8,
            EngineErrorKind::NotFound => 9,
            EngineErrorKind::InspectFailed | EngineErrorKind::LogsFailed => 10,
            EngineErrorKind::Spawn => 11,
        },
        Some(Error::HealthCheck(_)) => 12,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exit_codes_distinguish_the_taxonomy() {
        let config: anyhow::Error = Error::Config("missing field: image".into()).into();
        assert_eq!(exit_code_for(&config), 2);

        let build: anyhow::Error =
            Error::engine(EngineErrorKind::BuildFailed, "no Dockerfile").into();
        assert_eq!(exit_code_for(&build), 3);

        let run: anyhow::Error =
            Error::engine(EngineErrorKind::RunFailed, "port allocated").into();
        assert_eq!(exit_code_for(&run), 7);

        let health: anyhow::Error = Error::HealthCheck("3 consecutive failures".into()).into();
        assert_eq!(exit_code_for(&health), 12);

        let other: anyhow::Error = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&other), 1);
    }

    #[test]
    fn deploy_accepts_repeatable_flags() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "deploy",
            "--image",
            "myapp",
            "--tag",
            "v1.0.0",
            "--port",
            "3000:3000",
            "--port",
            "9090",
            "--volume",
            "data:/var/lib/data",
            "--restart",
            "unless-stopped",
            "--no-push",
        ])
        .unwrap();

        match cli.command {
            Commands::Deploy {
                image,
                ports,
                volumes,
                no_push,
                ..
            } => {
                assert_eq!(image.as_deref(), Some("myapp"));
                assert_eq!(ports.len(), 2);
                assert_eq!(volumes.len(), 1);
                assert!(no_push);
            }
            other => panic!("parsed the wrong subcommand: {:?}", other),
        }
    }
}
