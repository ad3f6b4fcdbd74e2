mod api;
mod server;

use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use std::path::{Path, PathBuf};
use demo_metrics::config::EngineConfig;
use demo_metrics::synth::synthesize;
use demo_metrics::{Engine, Policy};

#[derive(Parser)]
#[command(name = "demo-metrics", about = "Synthetic analytics for product demos")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the intercepting proxy in front of the analytics backend
    Serve(ServeArgs),
    /// Print the synthesized payload for one analytics URL
    Sample(SampleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8787)]
    port: u16,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the effective configuration back to the config path and exit
    #[arg(long)]
    write_config: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            config: None,
            write_config: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SampleArgs {
    /// Absolute URL of the analytics call, query string included
    url: String,
    #[arg(long, default_value = "GET")]
    method: String,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::serve(args).await,
        Command::Sample(args) => run_sample(args).await,
    }
}

async fn run_sample(args: SampleArgs) -> Result<(), String> {
    let (mut config, _) = EngineConfig::load(args.config)?;
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    config.store.persist_path = None;

    let method = Method::from_bytes(args.method.trim().to_uppercase().as_bytes())
        .map_err(|err| format!("invalid method {}: {}", args.method, err))?;
    let engine = Engine::load(config).await?;
    let classified = engine
        .classifier()
        .classify(&method, &args.url)
        .ok_or_else(|| format!("no analytics endpoint matches {} {}", method, args.url))?;

    eprintln!(
        "Endpoint: {} ({} / {})",
        classified.kind.label(),
        classified.domain.label(),
        classified.entity
    );
    let payload = synthesize(&engine, &classified, None, Policy::Fabricate)
        .await
        .map_err(|err| err.to_string())?;
    let rendered = serde_json::to_string_pretty(&payload)
        .map_err(|err| format!("failed to render payload: {}", err))?;
    println!("{}", rendered);
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}
