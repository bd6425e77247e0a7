//! Ringmaster CLI - chat REPL and one-shot tool execution

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use ringmaster_core::{AgentConfig, HttpLlmClient, Runtime};

#[derive(Parser)]
#[command(name = "ringmaster", about = "Tool orchestration runtime for LLM agents")]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat with the agent (default)
    Chat,
    /// List every registered tool
    Tools,
    /// Execute one tool and print the result
    Exec {
        /// Qualified tool name, e.g. calc_calculate
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Run the local HTTP bridge
    Serve {
        #[arg(long, default_value = "127.0.0.1:8765")]
        addr: std::net::SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let runtime = Arc::new(Runtime::builder(config.clone()).build().await?);
    runtime.watch_plugins()?;

    let result = match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&runtime).await,
        Command::Tools => {
            for descriptor in runtime.registry().list() {
                println!(
                    "{:40} [{}] {}",
                    descriptor.name,
                    descriptor.provider,
                    descriptor.description.lines().next().unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Exec { tool, params } => {
            let params: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&params).context("params must be a JSON object")?;
            let result = runtime.dispatcher().dispatch(&tool, params).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.is_success() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("tool call failed: {}", result.message))
            }
        }
        Command::Serve { addr } => ringmaster_http::serve(runtime.clone(), addr)
            .await
            .context("HTTP bridge failed"),
    };

    runtime.shutdown().await;
    result
}

async fn chat(runtime: &Arc<Runtime>) -> anyhow::Result<()> {
    let llm = Arc::new(HttpLlmClient::from_config(runtime.config()));
    let agent = runtime.agent(llm);

    println!("Ringmaster ready. /tools lists tools, /stats shows counters, /quit exits.");
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match line {
                    "/quit" | "/exit" => break,
                    "/tools" => {
                        for descriptor in runtime.registry().list() {
                            println!("  {}", descriptor.name);
                        }
                    }
                    "/stats" => {
                        println!("{}", serde_json::to_string_pretty(&agent.stats_snapshot())?);
                    }
                    "/clear" => {
                        agent.clear_history().await;
                        println!("History cleared.");
                    }
                    query => match agent.process_query(query).await {
                        Ok(answer) => println!("{}", answer),
                        Err(error) => eprintln!("error: {}", error),
                    },
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}
