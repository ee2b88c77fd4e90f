//! Toolgate CLI binary entry point.

mod cli;
mod errors;
mod logging;
mod repl;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolgate_core::agent::AnthropicAgent;
use toolgate_core::agent_loop::AgentLoop;
use toolgate_core::catalog::ToolCatalog;
use toolgate_core::config::ToolgateConfig;
use toolgate_core::mcp::{ClientPool, PoolConfig};
use toolgate_core::registry::{self, RegistryClient};
use toolgate_core::toolbox::Toolbox;
use toolgate_core::types::ServerDescriptor;

use cli::{Cli, USAGE};
use logging::TurnLogger;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout belongs to the REPL (or, in registry
    // serving mode, to the MCP protocol).
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let message = match e.downcast_ref::<toolgate_core::error::ToolgateError>() {
            Some(err) => errors::format_error_help(err),
            None => format!("{e}"),
        };
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ToolgateConfig::from_env();
    let pool = Arc::new(ClientPool::new(PoolConfig {
        capacity: config.pool_capacity,
        ttl: config.pool_ttl,
    }));

    if cli.serve_registry {
        let catalog = Arc::new(ToolCatalog::in_memory(pool));
        registry::serve_stdio(catalog).await?;
        return Ok(());
    }

    let (registry_server, servers) = parse_specs(&cli);

    let registry_client = Arc::new(RegistryClient::new(registry_server, Arc::clone(&pool)));
    if let Err(error) = registry_client.refresh_meta_tools().await {
        tracing::warn!(%error, "registry not reachable yet; using built-in meta tool surface");
    }

    let mut toolbox = Toolbox::new(Arc::clone(&pool), registry_client);
    for server in servers {
        let id = server.id();
        let installed = toolbox.connect_to_server(server).await?;
        tracing::info!(server = %id, tools = installed.len(), "connected server");
    }

    let agent = AnthropicAgent::from_config(&config)?;
    let agent_loop = AgentLoop::new(agent, toolbox).with_config(&config);

    let logger = TurnLogger::new(std::env::current_dir()?.join("logs"))?;
    repl::run(agent_loop, logger).await?;

    pool.clear().await;
    Ok(())
}

/// Parse the registry and server specs; usage violations exit non-zero.
fn parse_specs(cli: &Cli) -> (ServerDescriptor, Vec<ServerDescriptor>) {
    let Some(registry_spec) = &cli.registry else {
        eprintln!("missing registry spec\n{USAGE}");
        std::process::exit(1);
    };

    let registry = match ServerDescriptor::parse_spec(registry_spec) {
        Ok(server) => server,
        Err(error) => {
            eprintln!("{error}\n{USAGE}");
            std::process::exit(1);
        }
    };

    let mut servers = Vec::with_capacity(cli.servers.len());
    for spec in &cli.servers {
        match ServerDescriptor::parse_spec(spec) {
            Ok(server) => servers.push(server),
            Err(error) => {
                eprintln!("{error}\n{USAGE}");
                std::process::exit(1);
            }
        }
    }

    (registry, servers)
}
