use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use faultline::failure::FailureKind;

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(about = "Failure resolution for HTTP services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo HTTP server
    Server(ServerArgs),
    /// Resolve a single failure through the configured chain and print the outcome
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file (defaults to FAULTLINE_CONFIG or config/faultline.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Failure kind, e.g. bad-argument or generic-runtime-error
    #[arg(long)]
    pub kind: FailureKind,

    #[arg(long, default_value = "failure")]
    pub message: String,

    /// Accept header of the simulated request
    #[arg(long, default_value = "application/json")]
    pub accept: String,

    /// Originating handler, e.g. members::get_member
    #[arg(long)]
    pub handler: Option<String>,

    /// Configuration file (defaults to FAULTLINE_CONFIG or config/faultline.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
