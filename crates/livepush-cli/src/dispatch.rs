use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use livepush_core::{InstallMode, StatusReport};
use livepush_ledger::{LedgerLayout, MetadataLedger};
use livepush_lifecycle::{
    DecodeSignatureRequest, DeployRequest, HostBindings, InstallOutcome, InstallRequest,
    LifecycleEvent, PackageHashRequest, ReportRequest, UnzipRequest, UpdateService,
};

use crate::host::{CliConfig, ConfiguredHost, StdoutReports, TerminalContent};
use crate::render::{current_output_style, format_status_lines, print_status, OutputStyle};
use crate::{Cli, Commands, ReportOutcome};

/// One step of a `run` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStep {
    Event(LifecycleEvent),
    Restart,
    PageLoaded,
    Sleep(u64),
}

pub(crate) fn parse_run_step(token: &str) -> Result<RunStep> {
    if let Some(secs) = token.strip_prefix("sleep=") {
        let secs = secs
            .parse::<u64>()
            .with_context(|| format!("invalid sleep duration: '{secs}'"))?;
        return Ok(RunStep::Sleep(secs));
    }
    match token {
        "restart" => Ok(RunStep::Restart),
        "page-loaded" | "page_loaded" => Ok(RunStep::PageLoaded),
        other => LifecycleEvent::parse(other)
            .map(RunStep::Event)
            .ok_or_else(|| anyhow!("unknown lifecycle step: '{other}'")),
    }
}

/// Accepts a mode name or its numeric bridge code (`0`..`3`).
pub(crate) fn parse_install_mode(input: &str) -> Result<InstallMode> {
    InstallMode::parse(input)
        .or_else(|| input.trim().parse::<i64>().ok().and_then(InstallMode::from_code))
        .ok_or_else(|| {
            anyhow!(
                "invalid install mode '{input}' (expected immediate, on_next_restart, \
                 on_next_resume, on_next_suspend or a code 0-3)"
            )
        })
}

fn open_service(cli: &Cli, config: &CliConfig, style: OutputStyle) -> Result<UpdateService> {
    let ledger = MetadataLedger::open(LedgerLayout::new(cli.root.clone()))?;
    let bindings = HostBindings::new(
        Arc::new(TerminalContent::new(style)),
        Arc::new(StdoutReports::new(style)),
        Arc::new(ConfiguredHost::new(config.host.clone())),
    );
    Ok(UpdateService::new(ledger, config.update.clone(), bindings))
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let style = current_output_style();
    let config = CliConfig::load(&cli.config)?;
    let service = open_service(&cli, &config, style)?;

    match cli.command {
        Commands::Config => {
            let show = |value: Result<String, _>| -> String {
                match value {
                    Ok(value) => value,
                    Err(err) => format!("<{err}>"),
                }
            };
            println!("deployment key: {}", show(service.deployment_key()));
            println!("server url: {}", show(service.server_url()));
            println!(
                "signed updates: {}",
                if config.update.signing_enabled() {
                    "required"
                } else {
                    "not enforced"
                }
            );
            println!("launch url: {}", config.update.launch_url());
            println!("app version: {}", show(service.app_version()));
            println!(
                "native build time: {}",
                show(service.native_build_time().map(|time| time.to_string()))
            );
        }
        Commands::Verify { token, public_key } => {
            let signed_attestation = fs::read_to_string(&token)
                .with_context(|| format!("failed to read {}", token.display()))?;
            let public_key = match public_key {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => service.public_key()?,
            };
            let content_hash = service
                .decode_signature(DecodeSignatureRequest {
                    public_key,
                    signed_attestation,
                })
                .await?;
            println!("{content_hash}");
        }
        Commands::PackageHash { path } => {
            println!("{}", service.package_hash(PackageHashRequest { path }).await?);
        }
        Commands::BinaryHash => {
            println!("{}", service.binary_hash().await?);
        }
        Commands::Unzip { archive, target } => {
            service
                .unzip(UnzipRequest {
                    archive_path: archive.clone(),
                    target_dir: target.clone(),
                })
                .await?;
            print_status(
                style,
                "ok",
                &format!("extracted {} into {}", archive.display(), target.display()),
            );
        }
        Commands::Deploy {
            archive,
            label,
            package_hash,
            app_version,
            deployment_key,
        } => {
            let app_version = match app_version {
                Some(app_version) => app_version,
                None => service.app_version()?,
            };
            let deployment_key = match deployment_key {
                Some(deployment_key) => deployment_key,
                None => service.deployment_key()?,
            };
            let package = service
                .deploy_package(DeployRequest {
                    archive_path: archive,
                    label,
                    package_hash,
                    app_version,
                    deployment_key,
                })
                .await?;
            print_status(
                style,
                "ok",
                &format!(
                    "deployed {} ({}) at {}",
                    package.label, package.package_hash, package.local_path
                ),
            );
        }
        Commands::Install {
            start_location,
            mode,
            minimum_background_duration,
        } => {
            let install_mode = parse_install_mode(&mode)?;
            let outcome = service
                .install(InstallRequest::new(
                    start_location,
                    install_mode,
                    minimum_background_duration,
                ))
                .await?;
            match outcome {
                InstallOutcome::Applied(package) => {
                    print_status(style, "ok", &format!("applied {}", package.label));
                }
                InstallOutcome::Scheduled(options) => print_status(
                    style,
                    "ok",
                    &format!("scheduled install {}", options.install_mode.as_str()),
                ),
            }
        }
        Commands::PreInstall { start_location } => {
            service.pre_install(start_location.clone()).await?;
            print_status(style, "ok", &format!("start page found for {start_location}"));
        }
        Commands::IsFailedUpdate { package_hash } => {
            println!("{}", service.is_failed_update(package_hash).await?);
        }
        Commands::Report { outcome, report } => {
            let raw = fs::read_to_string(&report)
                .with_context(|| format!("failed to read {}", report.display()))?;
            let status_report: StatusReport = serde_json::from_str(&raw)
                .with_context(|| format!("invalid status report: {}", report.display()))?;
            let request = ReportRequest { status_report };
            match outcome {
                ReportOutcome::Succeeded => service.report_succeeded(request).await?,
                ReportOutcome::Failed => service.report_failed(request).await?,
            }
            print_status(style, "ok", "report recorded");
        }
        Commands::Status => {
            let state = service.snapshot().await?;
            for line in format_status_lines(&state) {
                println!("{line}");
            }
        }
        Commands::Run { events } => {
            let steps = events
                .iter()
                .map(|token| parse_run_step(token))
                .collect::<Result<Vec<_>>>()?;
            for step in steps {
                run_step(&service, style, step).await?;
            }
        }
    }

    Ok(())
}

async fn run_step(service: &UpdateService, style: OutputStyle, step: RunStep) -> Result<()> {
    match step {
        RunStep::Event(event) => {
            if let Some(state) = service.handle_event(event).await? {
                print_status(style, "ok", &format!("ready: {}", state.as_str()));
            }
        }
        RunStep::Restart => service.restart_application().await?,
        RunStep::PageLoaded => service.page_loaded().await?,
        RunStep::Sleep(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
    }
    Ok(())
}
