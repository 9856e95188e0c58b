//! Command-line interface parsing for shellcache
//!
//! This module handles parsing of CLI arguments using clap and turning the
//! raw strings of the `fetch` subcommand into a `Request`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::cache::default_cache_dir;
use crate::request::Request;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The method is not a valid HTTP method token
    #[error("Invalid method: '{0}'")]
    InvalidMethod(String),

    /// The URL could not be parsed as an absolute URL
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// No cache directory was given and none could be determined
    #[error("No cache directory available; pass --cache-dir")]
    NoCacheDir,
}

/// shellcache - offline app-shell cache for the scoreboard web app
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline app-shell cache: install, serve and inspect cached app assets")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to shellcache.toml in the platform config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache partitions (defaults to the platform cache directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install the configured version, caching the app shell, and activate it
    Install,

    /// Run one request through the interceptor and write the body to stdout
    ///
    /// Examples:
    ///   shellcache fetch http://localhost:8080/app.js
    ///   shellcache fetch http://localhost:8080/app.js --offline
    Fetch {
        /// Absolute URL to request
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Pretend the network is down and answer from the cache only
        #[arg(long)]
        offline: bool,
    },

    /// Delete the current version's cache partitions
    Clear,

    /// List cache partitions with entry counts and sizes
    Status,
}

/// Parses a method argument into an HTTP method.
///
/// # Arguments
/// * `s` - The method string from CLI, in any case
///
/// # Returns
/// * `Ok(Method)` if the string is a valid method token
/// * `Err(CliError::InvalidMethod)` otherwise
pub fn parse_method_arg(s: &str) -> Result<Method, CliError> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(s.to_string()))
}

/// Builds the request described by the `fetch` arguments.
pub fn parse_request(url: &str, method: &str) -> Result<Request, CliError> {
    let method = parse_method_arg(method)?;
    let url = Url::parse(url).map_err(|source| CliError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(Request::new(method, url))
}

impl Cli {
    /// The cache directory to use: `--cache-dir`, else the platform default
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, CliError> {
        self.cache_dir
            .clone()
            .or_else(default_cache_dir)
            .ok_or(CliError::NoCacheDir)
    }
}
