use crate::catalog::TypeCatalog;
use crate::endpoint::{DocumentEndpoint, RequestOrigin};
use crate::manifest::ApiManifest;
use crate::parser::AstParser;
use crate::scanner::FileScanner;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// openapi-synth - Build an OpenAPI document from typed route declarations
#[derive(Parser, Debug)]
#[command(name = "openapi-synth")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Rust project whose sources declare the API types
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// API manifest (YAML or JSON); defaults to api.yaml / api.json at the project root
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Render the document as served to a request from this origin, e.g. https://api.example.com:8443
    #[arg(long = "server-origin", value_name = "URL")]
    pub server_origin: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }
    if let Some(manifest) = &args.manifest {
        if !manifest.is_file() {
            anyhow::bail!("Manifest does not exist: {}", manifest.display());
        }
    }
    if let Some(origin) = &args.server_origin {
        RequestOrigin::parse(origin)?;
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.output_format);
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }

    Ok(args)
}

/// Run the main workflow: scan, parse, catalog, register routes, assemble, write.
pub fn run(args: CliArgs) -> Result<()> {
    info!("Scanning project directory...");
    let scan_result = FileScanner::new(args.project_path.clone()).scan()?;
    info!("Found {} Rust files", scan_result.rust_files.len());

    let manifest_path = args
        .manifest
        .clone()
        .or_else(|| scan_result.manifest.clone())
        .with_context(|| {
            format!(
                "No manifest given and none found in {}; pass one with --manifest",
                args.project_path.display()
            )
        })?;

    info!("Parsing Rust files...");
    let batch = AstParser::parse_files(&scan_result.rust_files);
    if !batch.failed.is_empty() {
        warn!("{} file(s) could not be parsed", batch.failed.len());
    }
    let catalog = TypeCatalog::from_parsed_files(&batch.parsed);
    info!("Catalog holds {} type declaration(s)", catalog.len());

    info!("Loading manifest {}", manifest_path.display());
    let manifest = ApiManifest::from_path(&manifest_path)?;
    let builder = manifest
        .into_builder(catalog)
        .context("Failed to register routes")?;
    let route_count = builder.len();
    let document = builder.build().context("Failed to assemble OpenAPI document")?;

    let content = match &args.server_origin {
        Some(origin) => {
            let origin = RequestOrigin::parse(origin)?;
            let endpoint = DocumentEndpoint::new(Arc::new(document));
            info!("Rendering as served to {}", origin.server_url());
            render(&endpoint.view(&origin), args.output_format)?
        }
        None => render(&document, args.output_format)?,
    };

    if let Some(output_path) = &args.output_path {
        write_to_file(&content, output_path)?;
        info!("Wrote OpenAPI document to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    info!("Summary:");
    info!("  - Files scanned: {}", scan_result.rust_files.len());
    info!("  - Files parsed: {}", batch.parsed.len());
    info!("  - Routes: {}", route_count);
    Ok(())
}

fn render<T: Serialize>(doc: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serialize_yaml(doc),
        OutputFormat::Json => serialize_json(doc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("models.rs"),
            "pub struct Pet { pub id: u64, pub name: String }\npub struct PetPath { pub id: u64 }",
        )
        .unwrap();
        fs::write(
            dir.path().join("api.yaml"),
            "info:\n  title: Pets\n  version: '1'\nroutes:\n  - method: get\n    path: /pets/{id}\n    params: PetPath\n    responses:\n      200:\n        type: Pet\n",
        )
        .unwrap();
        dir
    }

    fn args(project: &TempDir, output: PathBuf) -> CliArgs {
        CliArgs {
            project_path: project.path().to_path_buf(),
            manifest: None,
            output_format: OutputFormat::Json,
            output_path: Some(output),
            server_origin: None,
            verbose: false,
        }
    }

    #[test]
    fn test_run_writes_document() {
        let project = project();
        let output = project.path().join("out/openapi.json");
        run(args(&project, output.clone())).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(json["info"]["title"], "Pets");
        assert!(json["paths"]["/pets/{id}"]["get"].is_object());
        assert!(json["components"]["schemas"]["Pet"].is_object());
        assert!(json.get("servers").is_none());
    }

    #[test]
    fn test_run_with_server_origin() {
        let project = project();
        let output = project.path().join("served.json");
        let mut args = args(&project, output.clone());
        args.server_origin = Some("https://pets.example.com".to_string());
        run(args).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(json["servers"][0]["url"], "https://pets.example.com");
    }

    #[test]
    fn test_missing_manifest_is_reported() {
        let project = project();
        fs::remove_file(project.path().join("api.yaml")).unwrap();
        let err = run(args(&project, project.path().join("x.json"))).unwrap_err();
        assert!(err.to_string().contains("--manifest"));
    }

    #[test]
    fn test_invalid_origin_rejected_up_front() {
        let project = project();
        let mut args = args(&project, project.path().join("x.json"));
        args.server_origin = Some("not a url".to_string());
        assert!(parse_args_from_parsed(args).is_err());
    }
}
