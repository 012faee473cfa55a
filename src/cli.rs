use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "runecast")]
#[command(version)]
#[command(about = "Agent lifecycle and real-time broadcast coordinator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "RUNECAST_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP/WebSocket server (default)
    Serve {
        /// Override server.port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
    },
    /// Load and validate configuration, then exit
    CheckConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            port: None,
            host: None,
        }
    }
}
