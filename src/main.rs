use std::path::PathBuf;
use std::sync::Arc;

use canary_shift::controller::{InMemoryStore, KubePodLiveness, PodLiveness};
use canary_shift::{
    selector, telemetry, ClearMode, Error, LogConfig, MeshConfig, MeshContext, ResourceSet,
    Selector, Shift, TrafficOperator, TrafficSpec,
};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Instrument};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// TOML file with mesh settings; flags override its values
    #[arg(long, global = true, env = "CANARY_SHIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace of the mesh resources
    #[arg(long, short = 'n', global = true, env = "CANARY_SHIFT_NAMESPACE")]
    namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long, global = true, env = "CANARY_SHIFT_CONTEXT")]
    context: Option<String>,

    /// Apply changes to an in-memory copy and print the result
    #[arg(long, global = true, env = "DRY_RUN")]
    dry_run: bool,

    /// Emit JSON log lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    /// Environment tag recorded on every log line
    #[arg(long, global = true, env = "CANARY_SHIFT_ENVIRONMENT")]
    environment: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and shift service traffic
    #[command(subcommand)]
    Traffic(TrafficCommand),
}

#[derive(Subcommand, Debug)]
enum TrafficCommand {
    /// Show the routing and subset resources of a service
    Show {
        /// Label selector of the service's mesh resources, e.g. app=reviews
        #[arg(long, short = 's', value_parser = parse_selector)]
        selector: Selector,
    },
    /// Change how traffic reaches the canary
    #[command(subcommand)]
    Shift(ShiftCommand),
}

#[derive(Subcommand, Debug)]
enum ShiftCommand {
    /// Route a percentage of traffic to the canary pods
    Weight {
        #[command(flatten)]
        target: TargetArgs,

        /// Percentage of traffic, 1 to 100
        #[arg(long, short = 'w')]
        weight: i32,
    },
    /// Route requests carrying the given headers to the canary pods
    Headers {
        #[command(flatten)]
        target: TargetArgs,

        /// Header exact-matches, e.g. x-canary=true,x-user=qa
        #[arg(long = "header", value_parser = parse_selector)]
        headers: Selector,
    },
    /// Strip canary rules back to the master rule
    Clear {
        /// Label selector of the service's mesh resources
        #[arg(long, short = 's', value_parser = parse_selector)]
        selector: Selector,

        /// hard removes every subset, soft only those without live pods
        #[arg(long, default_value_t = ClearMode::Hard)]
        mode: ClearMode,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Label selector of the service's mesh resources, e.g. app=reviews
    #[arg(long, short = 's', value_parser = parse_selector)]
    selector: Selector,

    /// Labels of the canary pods, e.g. version=2.1.3
    #[arg(long, short = 'p', value_parser = parse_selector)]
    pod_selector: Selector,

    /// Destination host of the canary route
    #[arg(long)]
    hostname: String,

    /// Destination port of the canary route
    #[arg(long, default_value_t = 0)]
    port: u32,

    /// Build number folded into the subset name
    #[arg(long, default_value_t = 0, env = "BUILD_NUMBER")]
    build: u64,
}

impl TargetArgs {
    fn into_shift(self, request_headers: Selector, weight: i32) -> Shift {
        Shift {
            port: self.port,
            hostname: self.hostname,
            selector: self.selector,
            traffic: TrafficSpec {
                pod_selector: self.pod_selector,
                request_headers,
                weight,
            },
            build: self.build,
        }
    }
}

fn parse_selector(text: &str) -> Result<Selector, String> {
    selector::parse(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        json: cli.global.log_json,
        environment: cli.global.environment.clone(),
        ..Default::default()
    };
    telemetry::init(&log_config)?;

    let span = telemetry::root_span(&log_config);
    let result = run(cli).instrument(span).await;
    telemetry::shutdown();
    result
}

fn mesh_config(global: &GlobalArgs) -> Result<MeshConfig, Error> {
    let mut config = match &global.config {
        Some(path) => MeshConfig::from_file(path)?,
        None => MeshConfig::default(),
    };
    if let Some(namespace) = &global.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(context) = &global.context {
        config.context = Some(context.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = mesh_config(&cli.global)?;
    let ctx = MeshContext::connect(&config).await?;
    let operator = TrafficOperator::from_context(&ctx);

    let command = match cli.command {
        Commands::Traffic(TrafficCommand::Show { selector }) => {
            let set = operator.get(&selector).await?;
            return print_resource_set(&set);
        }
        Commands::Traffic(TrafficCommand::Shift(command)) => command,
    };

    let (shift, mode) = match command {
        ShiftCommand::Weight { target, weight } => {
            (target.into_shift(Selector::new(), weight), None)
        }
        ShiftCommand::Headers { target, headers } => (target.into_shift(headers, 0), None),
        ShiftCommand::Clear { selector, mode } => (
            Shift {
                selector,
                ..Default::default()
            },
            Some(mode),
        ),
    };

    if cli.global.dry_run {
        return dry_run(&ctx, &operator, &shift, mode).await;
    }

    match mode {
        Some(mode) => operator.clear(&shift, mode).await?,
        None => operator.update(&shift).await?,
    }
    info!("Traffic for {} updated", selector::stringify(&shift.selector)?);
    Ok(())
}

/// Replay the operation against an in-memory copy of the live resources
async fn dry_run(
    ctx: &MeshContext,
    live: &TrafficOperator,
    shift: &Shift,
    mode: Option<ClearMode>,
) -> Result<(), Error> {
    if shift.selector.is_empty() {
        return Err(Error::MissingSelector);
    }

    let current = live.get(&shift.selector).await?;
    let store = Arc::new(InMemoryStore::new());
    for rule in &current.subset_resources {
        store.insert(rule).await;
    }
    for vs in &current.route_resources {
        store.insert(vs).await;
    }

    let liveness: Arc<dyn PodLiveness> = Arc::new(KubePodLiveness::new(ctx.client.clone()));
    let operator = TrafficOperator::new(store, liveness, &ctx.config.namespace);
    match mode {
        Some(mode) => operator.clear(shift, mode).await?,
        None => operator.update(shift).await?,
    }

    info!("Dry run, nothing was written");
    print_resource_set(&operator.get(&shift.selector).await?)
}

fn print_resource_set(set: &ResourceSet) -> Result<(), Error> {
    let yaml = serde_yaml::to_string(set)
        .map_err(|e| Error::ConfigError(format!("failed to render resources: {}", e)))?;
    print!("{}", yaml);
    Ok(())
}
