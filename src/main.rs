use anyhow::Context;
use clap::Parser;
use meridian::cli::{
    alerts, generate, handle_completions, handle_config_init, health, models, Cli, Commands,
    ConfigCommands, Runtime,
};
use meridian::metrics::{setup_metrics, MetricsCollector};
use std::time::Instant;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Models(args) => {
            let runtime = Runtime::from_args(&args.common)?;
            println!("{}", models::handle_models(&args, &runtime.registry).await?);
        }
        Commands::Health(args) => {
            let runtime = Runtime::from_args(&args.common)?;
            let output = health::handle_health(
                &args,
                runtime.registry.clone(),
                runtime.config.health_check.clone(),
            )
            .await?;
            println!("{output}");
        }
        Commands::Generate(args) => {
            let runtime = Runtime::from_args(&args.common)?;
            runtime.registry.refresh_catalog().await;
            let mut stdout = std::io::stdout();
            generate::handle_generate(&args, &runtime.gateway, &mut stdout).await?;
        }
        Commands::Alerts(args) => {
            let started = Instant::now();
            let handle = if args.prometheus {
                Some(setup_metrics().map_err(|e| {
                    anyhow::anyhow!("failed to install metrics recorder: {e}")
                })?)
            } else {
                None
            };
            let runtime = Runtime::from_args(&args.common)?;
            let output = alerts::handle_alerts(
                &args,
                &runtime.gateway,
                &runtime.performance,
                &runtime.config.alerts,
            )
            .await?;
            println!("{output}");
            if let Some(handle) = handle {
                let collector = MetricsCollector::new(runtime.registry.clone(), started, handle);
                println!("{}", collector.render_metrics());
            }
        }
        Commands::Config(ConfigCommands::Init(args)) => {
            handle_config_init(&args).context("config init failed")?;
        }
        Commands::Completions(args) => handle_completions(&args),
    }
    Ok(())
}
