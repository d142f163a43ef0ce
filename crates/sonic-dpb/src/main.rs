//! dpb entry point.
//!
//! Changes the breakout mode of a port in CONFIG_DB.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sonic_config_db::{ConfigReader, RedisConfig, RedisConfigStore};
use sonic_dpb::config_file::DEFAULT_CONFIG_PATH;
use sonic_dpb::{
    fields, BreakoutDescriptor, BreakoutLock, BreakoutOutcome, BreakoutRequest, DpbConfig,
    DpbError, SafetySequencer, StdinConfirmer, CFG_BREAKOUT_CFG_TABLE_NAME, EXIT_ABORTED,
};

/// SONiC Dynamic Port Breakout
#[derive(Parser, Debug)]
#[command(name = "dpb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Breakout descriptor, overriding the configured one
    #[arg(short = 'd', long, global = true)]
    descriptor: Option<PathBuf>,

    /// Redis server host, overriding the configured one
    #[arg(long, global = true)]
    redis_host: Option<String>,

    /// Redis server port, overriding the configured one
    #[arg(long, global = true)]
    redis_port: Option<u16>,

    /// Debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Change the breakout mode of a port
    Breakout {
        /// Parent port (e.g., Ethernet0)
        port: String,

        /// Target breakout mode (e.g., 4x25G[10G])
        mode: String,

        /// Proceed even if configuration references ports to be deleted
        #[arg(short = 'f', long)]
        force: bool,

        /// Write default configuration for new ports
        #[arg(short = 'l', long)]
        load_defaults: bool,

        /// Do not ask for confirmation of the plan
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show what a breakout would change, without changing anything
    Plan {
        /// Parent port
        port: String,

        /// Target breakout mode
        mode: String,
    },

    /// List supported, default and current breakout modes
    Modes {
        /// Only this port
        port: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

struct Runtime {
    config: DpbConfig,
    descriptor: BreakoutDescriptor,
    store: RedisConfigStore,
}

async fn setup(cli: &Cli) -> anyhow::Result<Runtime> {
    let mut config = DpbConfig::load_or_default(&cli.config)?;
    if let Some(path) = &cli.descriptor {
        config.breakout.descriptor_path = path.clone();
    }
    if let Some(host) = &cli.redis_host {
        config.database.redis_host = host.clone();
    }
    if let Some(port) = cli.redis_port {
        config.database.redis_port = port;
    }
    config.validate()?;

    let descriptor = BreakoutDescriptor::load(&config.breakout.descriptor_path).with_context(|| {
        format!(
            "Failed to load breakout descriptor {}",
            config.breakout.descriptor_path.display()
        )
    })?;

    let redis = RedisConfig::new(
        config.database.redis_host.clone(),
        config.database.redis_port,
        config.database.config_db_number,
    );
    info!("CONFIG_DB: {}", redis.uri());
    let store = RedisConfigStore::connect(redis)
        .await
        .context("Failed to connect to CONFIG_DB")?;

    Ok(Runtime {
        config,
        descriptor,
        store,
    })
}

async fn breakout(ctx: &Runtime, request: BreakoutRequest) -> Result<(), DpbError> {
    ctx.descriptor.group(&request.port)?;
    let _lock = BreakoutLock::acquire(&ctx.config.lock.dir, &request.port, ctx.config.lock.ttl_secs)?;

    let registry = ctx.config.registry();
    let defaults = ctx.config.port_defaults();
    let confirmer = StdinConfirmer;
    let mut sequencer = SafetySequencer::new(&ctx.descriptor, &registry, &ctx.store, &confirmer)
        .with_defaults(&defaults)
        .with_options(ctx.config.sequencer_options());

    match sequencer.run(&request).await? {
        BreakoutOutcome::NoOp { port, mode } => {
            println!("{} is already in breakout mode {}, no action taken", port, mode);
        }
        BreakoutOutcome::Done(summary) => {
            println!(
                "Breakout {} {} -> {} done",
                summary.plan.port, summary.plan.current_mode, summary.plan.target_mode
            );
            println!("  deleted:   {}", summary.plan.delete_names().join(", "));
            println!("  added:     {}", summary.plan.add_names().join(", "));
            println!("  preserved: {}", summary.plan.preserved.join(", "));
            for row in &summary.forced {
                println!("  forced past: {}", row);
            }
            if let Some(path) = &summary.artifact {
                println!("New port configuration: {}", path.display());
            }
        }
    }
    Ok(())
}

async fn plan(ctx: &Runtime, port: &str, mode: &str) -> Result<(), DpbError> {
    let registry = ctx.config.registry();
    let confirmer = StdinConfirmer;
    let sequencer = SafetySequencer::new(&ctx.descriptor, &registry, &ctx.store, &confirmer);
    let preview = sequencer.preview(port, mode).await?;

    println!(
        "Breakout {} {} -> {}",
        port, preview.plan.current_mode, preview.plan.target_mode
    );
    if preview.plan.current_mode == preview.plan.target_mode {
        println!("  no change");
        return Ok(());
    }
    for child in &preview.plan.delete {
        println!("  delete   {}", child);
    }
    for child in &preview.plan.add {
        println!("  add      {} lanes {}", child, child.lanes_field());
    }
    for name in &preview.plan.preserved {
        println!("  preserve {}", name);
    }
    for row in &preview.dependencies.modeled {
        println!("  blocking dependency: {}", row);
    }
    for row in &preview.dependencies.unmodeled {
        println!("  unverifiable reference: {}", row);
    }
    Ok(())
}

async fn modes(ctx: &Runtime, port: Option<&str>) -> Result<(), DpbError> {
    let ports: Vec<String> = match port {
        Some(port) => vec![port.to_string()],
        None => ctx.descriptor.ports().map(str::to_string).collect(),
    };

    for name in ports {
        let group = ctx.descriptor.group(&name)?;
        let current = ctx
            .store
            .get_field(CFG_BREAKOUT_CFG_TABLE_NAME, &name, fields::BRKOUT_MODE)
            .await?;
        println!("{}:", name);
        println!("  current:   {}", current.as_deref().unwrap_or("(not recorded)"));
        println!(
            "  default:   {}",
            group.default_mode.as_deref().unwrap_or("(none)")
        );
        println!("  supported: {}", group.supported_modes().join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = match setup(&cli).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_ABORTED);
        }
    };

    let result = match &cli.command {
        Command::Breakout {
            port,
            mode,
            force,
            load_defaults,
            yes,
        } => {
            let request = BreakoutRequest::new(port, mode)
                .with_force(*force)
                .with_load_defaults(*load_defaults)
                .with_assume_yes(*yes);
            breakout(&ctx, request).await
        }
        Command::Plan { port, mode } => plan(&ctx, port, mode).await,
        Command::Modes { port } => modes(&ctx, port.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_retryable() {
                warn!("{}", e);
            } else {
                error!("{}", e);
            }
            ExitCode::from(e.exit_code())
        }
    }
}
