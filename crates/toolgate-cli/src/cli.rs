//! Argument surface.

use clap::Parser;

pub const USAGE: &str = "usage: toolgate <registry-spec> [<server-spec> ...]\n\
       spec form: url::type, type one of sse, stdio, ws\n\
       example: toolgate http://localhost:8080/sse::sse ./weather.py::stdio";

/// Registry-gated MCP client REPL.
#[derive(Debug, Parser)]
#[command(name = "toolgate", version, about = "Registry-gated MCP client")]
pub struct Cli {
    /// Serve the in-process registry catalogue as an MCP server on stdio.
    #[arg(long)]
    pub serve_registry: bool,

    /// Registry spec in `url::type` form.
    pub registry: Option<String>,

    /// Servers to connect eagerly at startup, same spec form.
    pub servers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_and_servers() {
        let cli = Cli::parse_from([
            "toolgate",
            "http://localhost:8080/sse::sse",
            "./weather.py::stdio",
            "ws://tools:9001::ws",
        ]);
        assert!(!cli.serve_registry);
        assert_eq!(cli.registry.as_deref(), Some("http://localhost:8080/sse::sse"));
        assert_eq!(cli.servers.len(), 2);
    }

    #[test]
    fn serve_registry_needs_no_positional_args() {
        let cli = Cli::parse_from(["toolgate", "--serve-registry"]);
        assert!(cli.serve_registry);
        assert!(cli.registry.is_none());
    }
}
