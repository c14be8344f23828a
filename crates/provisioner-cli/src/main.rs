//! `toolgate` binary: registers registry-declared tool APIs with a gateway
//! and tears them down again.

mod config;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize as _;
use std::path::PathBuf;
use std::time::Duration;
use toolgate_control_plane::{CliTransport, CloudApi, ConsoleApi, HttpTransport, RetryPolicy};
use toolgate_provisioner::{
    CloudPipeline, CloudPipelineOptions, HttpSpecSource, RunReport, RunStatus, StandalonePipeline,
    StandalonePipelineOptions, cleanup, load_units,
};
use toolgate_tool_config::Converter;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const CONVERTER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(
    name = "toolgate",
    version,
    about = "Provision registry-declared tool APIs on a gateway"
)]
struct Cli {
    /// Config file path (defaults to $XDG_CONFIG_HOME/toolgate/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v for debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile every tool unit in the registry against the gateway.
    Register(RegisterArgs),
    /// Remove previously provisioned tool routes and plugin attachments.
    Cleanup(CleanupArgs),
    /// Persist default gateway settings to the config file.
    Config(ConfigArgs),
}

#[derive(clap::Args)]
struct RegisterArgs {
    /// Registry document listing the tool units.
    #[arg(long)]
    registry: PathBuf,

    /// Self-hosted console base URL.
    #[arg(long, env = "TOOLGATE_GATEWAY")]
    gateway: Option<String>,

    /// Cloud gateway id; selects the cloud control plane.
    #[arg(long, env = "TOOLGATE_GATEWAY_ID")]
    gateway_id: Option<String>,

    /// Cloud region, required with --gateway-id.
    #[arg(long, env = "TOOLGATE_REGION")]
    region: Option<String>,

    /// Host where the tool backends listen (port 8000 assumed if bare).
    #[arg(long)]
    private_ip: String,

    /// Bearer token for the provisioned consumer and plugin config.
    #[arg(long, env = "TOOLGATE_API_KEY")]
    api_key: Option<String>,

    /// Base URL serving `<name>/openapi.json` per unit.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    openapi_base_url: String,

    /// Pre-resolved domain id (cloud); discovered when omitted.
    #[arg(long)]
    domain_id: Option<String>,

    /// Pre-resolved tool plugin id (cloud); discovered when omitted.
    #[arg(long)]
    plugin_id: Option<String>,

    /// Provision routes without authentication.
    #[arg(long)]
    skip_auth: bool,

    /// Rewrite plugin configuration even when nothing changed.
    #[arg(long)]
    force_update: bool,

    /// Console login user (self-hosted).
    #[arg(long, default_value = "admin")]
    username: String,

    /// Console login password (self-hosted).
    #[arg(long, env = "TOOLGATE_PASSWORD")]
    password: Option<String>,

    /// Consumer identity allowed on the provisioned routes.
    #[arg(long, default_value = "toolgate")]
    consumer: String,

    /// OpenAPI converter binary.
    #[arg(long, default_value = "openapi-to-mcp")]
    converter: PathBuf,
}

#[derive(clap::Args)]
struct CleanupArgs {
    #[arg(long, env = "TOOLGATE_GATEWAY_ID")]
    gateway_id: Option<String>,

    #[arg(long, env = "TOOLGATE_REGION")]
    region: Option<String>,

    #[arg(long)]
    plugin_id: Option<String>,
}

#[derive(clap::Args)]
struct ConfigArgs {
    #[arg(long)]
    gateway: Option<String>,

    #[arg(long)]
    gateway_id: Option<String>,

    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    api_key: Option<String>,
}

fn init_logging(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = match &cli.config {
        Some(p) => p.clone(),
        None => config::default_config_path()?,
    };
    let cfg = config::load_config(&config_path)?;
    match cli.command {
        Command::Register(args) => register(args, cfg).await,
        Command::Cleanup(args) => run_cleanup(args, cfg).await,
        Command::Config(args) => set_config(args, &config_path, cfg),
    }
}

fn set_config(
    args: ConfigArgs,
    path: &std::path::Path,
    mut cfg: config::CliConfig,
) -> anyhow::Result<()> {
    if let Some(v) = args.gateway {
        cfg.gateway = Some(v);
    }
    if let Some(v) = args.gateway_id {
        cfg.gateway_id = Some(v);
    }
    if let Some(v) = args.region {
        cfg.region = Some(v);
    }
    if let Some(v) = args.api_key {
        cfg.api_key = Some(v);
    }
    config::save_config(path, &cfg)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn register(args: RegisterArgs, cfg: config::CliConfig) -> anyhow::Result<()> {
    let api_key = args
        .api_key
        .or(cfg.api_key)
        .context("--api-key is required (flag, TOOLGATE_API_KEY, or config file)")?;
    let units = load_units(&args.registry, &args.openapi_base_url)?;
    if units.is_empty() {
        anyhow::bail!("registry declares no tool units");
    }
    tracing::info!(count = units.len(), "registering tool units");

    let specs = HttpSpecSource::new(CALL_TIMEOUT)?;
    let converter = Converter::new(args.converter.clone(), CONVERTER_TIMEOUT);

    let report = if let Some(gateway_id) = args.gateway_id.clone().or(cfg.gateway_id) {
        let region = args
            .region
            .or(cfg.region)
            .context("--region is required with --gateway-id")?;
        let transport = CliTransport::new(PathBuf::from("aliyun"), region, CALL_TIMEOUT);
        let api = CloudApi::new(&transport, RetryPolicy::default(), gateway_id);
        let pipeline = CloudPipeline::new(
            &api,
            &specs,
            &converter,
            CloudPipelineOptions {
                backend_host: args.private_ip.clone(),
                openapi_base_url: args.openapi_base_url.clone(),
                api_key,
                skip_auth: args.skip_auth,
                force_update: args.force_update,
                domain_id: args.domain_id.clone(),
                plugin_id: args.plugin_id.clone(),
            },
        );
        pipeline.run(&units).await?
    } else {
        let gateway = args
            .gateway
            .or(cfg.gateway)
            .context("either --gateway or --gateway-id is required")?;
        let base: url::Url = gateway
            .parse()
            .with_context(|| format!("invalid gateway URL '{gateway}'"))?;
        let transport = HttpTransport::new(base, CALL_TIMEOUT)?;
        let password = args.password.as_deref().unwrap_or("admin");
        transport.bootstrap(&args.username, password).await?;
        let api = ConsoleApi::new(&transport, RetryPolicy::default());
        let pipeline = StandalonePipeline::new(
            &api,
            &specs,
            &converter,
            StandalonePipelineOptions {
                consumer_name: args.consumer.clone(),
                api_key,
                backend_host: args.private_ip.clone(),
                openapi_base_url: args.openapi_base_url.clone(),
                skip_auth: args.skip_auth,
                force_update: args.force_update,
            },
        );
        pipeline.run(&units).await?
    };

    print_report(&report);
    match report.status() {
        RunStatus::AllSucceeded => Ok(()),
        RunStatus::NoUnits => anyhow::bail!("no tool units processed"),
        _ => anyhow::bail!(
            "{} of {} tool units failed",
            report.failed_count(),
            report.results.len()
        ),
    }
}

async fn run_cleanup(args: CleanupArgs, cfg: config::CliConfig) -> anyhow::Result<()> {
    let gateway_id = args
        .gateway_id
        .or(cfg.gateway_id)
        .context("--gateway-id is required")?;
    let region = args
        .region
        .or(cfg.region)
        .context("--region is required")?;
    let transport = CliTransport::new(PathBuf::from("aliyun"), region, CALL_TIMEOUT);
    let api = CloudApi::new(&transport, RetryPolicy::default(), gateway_id);

    let report = cleanup(&api, args.plugin_id.as_deref()).await?;
    for name in &report.removed {
        println!("{} {name}", "removed".green());
    }
    for name in &report.failed {
        println!("{} {name}", "failed".red());
    }
    println!(
        "{} removed, {} failed",
        report.removed.len(),
        report.failed.len()
    );
    if report.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} routes could not be removed", report.failed.len())
    }
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        let status = if result.succeeded() {
            format!("{}", "ok".green())
        } else {
            format!("{}", "failed".red())
        };
        println!("{:<24} {status}", result.name.bold());
        for (label, outcome) in [
            ("service", &result.service),
            ("route", &result.route),
            ("plugin", &result.plugin),
        ] {
            if let Some(outcome) = outcome {
                println!("    {label:<8} {outcome}");
            }
        }
        if let Some(error) = &result.error {
            println!("    {}  {error}", "error".red());
        }
    }
    println!(
        "{} succeeded, {} failed",
        report.succeeded_count(),
        report.failed_count()
    );
}
