//! openapi-synth - command-line front end.
//!
//! Reads the type declarations of a Rust project and an API manifest, and
//! writes the assembled OpenAPI 3.0 document.
//!
//! # Usage
//!
//! ```bash
//! openapi-synth [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! Generate YAML using the project's `api.yaml`:
//! ```bash
//! openapi-synth ./my-api-project -o openapi.yaml
//! ```
//!
//! Generate JSON as it would be served to a given origin:
//! ```bash
//! openapi-synth ./my-api-project -m api.yaml -f json --server-origin https://api.example.com
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_synth::cli;

fn main() -> Result<()> {
    // Parse once up front so the verbose flag can set the log level
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("openapi-synth starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");
    Ok(())
}
