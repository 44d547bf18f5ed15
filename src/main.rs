mod cli;

use std::path::PathBuf;

use axum::http::{HeaderMap, HeaderValue, Method, Uri, header};
use clap::Parser;
use cli::{Cli, Commands, ResolveArgs};
use faultline::api;
use faultline::config::Config;
use faultline::failure::Failure;
use faultline::observability;
use faultline::resolve::RequestHead;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = load_config(args.config)?;
            observability::init_tracing(&config.telemetry)?;
            api::run(args.address, config).await?
        }
        Commands::Resolve(args) => {
            let config = load_config(args.config.clone())?;
            observability::init_tracing(&config.telemetry)?;
            resolve(&config, args)?
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn resolve(config: &Config, args: ResolveArgs) -> Result<(), AnyError> {
    let chain = config.resolver_chain(api::advice::registry()?)?;

    let mut failure = Failure::new(args.kind, args.message);
    if let Some(handler) = args.handler {
        failure = failure.in_handler(handler);
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_str(&args.accept)?);
    let head = RequestHead::new(Method::GET, Uri::from_static("/"), headers);

    let outcome = chain.dispatch(&failure, &head)?;
    println!("{}", serde_json::to_string_pretty(&outcome.describe())?);

    Ok(())
}
