//! # CLI
//!
//! This module defines the command-line interface of `reflex` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring upstreams
//! are `name=url`). Every flag overrides the matching value of the configuration file.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "reflex",
    version,
    about = "Expose gRPC services as JSON over HTTP, discovered through server reflection"
)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Upstream gRPC server with reflection enabled, as `name=url`. Can be repeated.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// reflex --upstream users=http://localhost:50051 --upstream billing=http://localhost:50052
    /// ```
    #[arg(short = 'u', long = "upstream", value_parser = parse_upstream)]
    pub upstreams: Vec<(String, String)>,

    /// Prefix prepended to every bridged route (e.g. `api`)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Base URL advertised in the generated OpenAPI documents
    #[arg(long)]
    pub public_url: Option<String>,

    /// Deadline of a whole discovery run, in seconds
    #[arg(long)]
    pub discovery_timeout: Option<u64>,

    /// Deadline of each bridged call, in milliseconds
    #[arg(long)]
    pub call_timeout: Option<u64>,
}

fn parse_upstream(value: &str) -> Result<(String, String), String> {
    let (name, url) = value
        .split_once('=')
        .ok_or_else(|| format!("Invalid upstream format: '{value}'. Expected 'name=url'"))?;

    let (name, url) = (name.trim(), url.trim());

    if name.is_empty() || url.is_empty() {
        return Err("Upstream name and URL cannot be empty".to_string());
    }

    Ok((name.to_string(), url.to_string()))
}
