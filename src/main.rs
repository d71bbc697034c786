//! quorum - CLI entry point

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::info;

use quorum::cli::{Cli, Command, IdeCommand};
use quorum::config::Config;
use quorum::ide::{Hub, IdeServer, workspace_port};
use quorum::runner::{RunError, RunResult, Runner};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // CLI --log-level wins over the config file; default is INFO. Logs go to
    // stderr so stdout stays clean for the IDE discovery side-channel.
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{other}', defaulting to INFO");
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref())?;
    setup_logging(cli.log_level.as_deref(), Some(config.logging.level.as_str()))?;

    match cli.command {
        Command::Run { prompt, json } => run_command(config, &prompt, json).await,
        Command::Ide { command } => match command {
            IdeCommand::Connect => ide_connect_command(config).await,
            IdeCommand::Status => ide_status_command(&config),
        },
    }
}

async fn run_command(config: Config, prompt: &str, json: bool) -> Result<()> {
    let runner = Runner::new(config.clone()).map_err(|e| eyre!("failed to create runner: {e}"))?;

    if !json {
        println!("Running prompt: {prompt:?}");
        println!(
            "Workers: {}, Algorithm: {}\n",
            config.workers.len(),
            config.consensus.algorithm
        );
    }

    let outcome = runner.run(prompt).await;
    runner.close().await;

    match outcome {
        Ok(result) => {
            display_results(&result, json)?;
            Ok(())
        }
        Err(RunError::Consensus { error, result }) => {
            // Worker answers exist even though the run failed; show both.
            display_results(&result, json)?;
            Err(eyre!("consensus failed: {error}"))
        }
        Err(e) => Err(eyre!("failed to run: {e}")),
    }
}

fn display_results(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialize result")?
        );
        return Ok(());
    }

    println!("{}", "=== RESULTS ===".bold());
    println!("Duration: {:?}", result.total_duration);
    println!("Total Tokens: {}", result.total_tokens);
    println!("Estimated Cost: ${:.6}", result.estimated_cost);
    println!("Success: {}\n", result.success);

    println!("{}", "=== WORKER RESPONSES ===".bold());
    for (i, worker) in result.workers.iter().enumerate() {
        print!("[{}] {}", i + 1, worker.worker_id.bold());
        if let Some(stats) = &worker.stats {
            print!(" ({}, {:?})", stats.model, stats.duration);
        }
        println!();

        match &worker.error {
            Some(error) => println!("{} {error}", "Error:".red()),
            None => {
                print!("{}", "Success".green());
                if let Some(usage) = &worker.tokens_used {
                    let cost = worker.stats.as_ref().map(|s| s.estimated_cost).unwrap_or(0.0);
                    print!(" ({} tokens, ${cost:.6})", usage.total_tokens);
                }
                println!();
                println!("Response: {}", worker.content);
            }
        }
        println!();
    }

    if let Some(consensus) = &result.consensus {
        println!("{}", "=== CONSENSUS ===".bold());
        println!("Algorithm: {}", consensus.algorithm);
        println!("Winner: {}", consensus.winner.bold());
        println!("Confidence: {:.2}", consensus.confidence);
        println!("Reasoning: {}", consensus.reasoning);
        println!("Final Answer: {}", consensus.content);
    }

    Ok(())
}

async fn ide_connect_command(config: Config) -> Result<()> {
    if !config.ide.enable {
        return Err(eyre!(
            "IDE integration is disabled in config. Set ide.enable: true in quorum.yml"
        ));
    }

    let workspace = std::env::current_dir().context("Failed to resolve workspace directory")?;
    let server = IdeServer::new(config.ide, &workspace.to_string_lossy());
    let (hub, handle) = Hub::new();

    println!("Starting quorum IDE integration...");
    println!("Editor extension should auto-detect and connect on port {}", server.port());
    println!("Press Ctrl+C to stop\n");

    server.serve(hub, handle).await
}

fn ide_status_command(config: &Config) -> Result<()> {
    println!("quorum IDE Integration Status");
    println!("=============================\n");

    if config.ide.enable {
        let workspace = std::env::current_dir().context("Failed to resolve workspace directory")?;
        let port = if config.ide.port != 0 {
            config.ide.port
        } else {
            workspace_port(&workspace.to_string_lossy())
        };

        println!("IDE Integration: {}", "Enabled".green());
        println!("Transport: {}", config.ide.transport);
        println!("Diff Tool: {}", config.ide.diff_tool);
        println!("Port: {port}");
        println!("\nTo connect:\n  quorum ide connect");
    } else {
        println!("IDE Integration: {}", "Disabled".red());
        println!("\nTo enable, add to quorum.yml:\n  ide:\n    enable: true");
    }

    Ok(())
}
