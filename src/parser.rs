use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Parser for the Rust sources that declare an API's types.
///
/// Files are parsed with `syn`; the [`TypeCatalog`](crate::catalog::TypeCatalog)
/// then collects the struct, enum, alias and trait declarations from the
/// resulting syntax trees.
///
/// # Example
///
/// ```no_run
/// use openapi_synth::catalog::TypeCatalog;
/// use openapi_synth::parser::AstParser;
/// use std::path::PathBuf;
///
/// let batch = AstParser::parse_files(&[PathBuf::from("src/models.rs")]);
/// let catalog = TypeCatalog::from_parsed_files(&batch.parsed);
/// println!("{} types declared", catalog.len());
/// ```
pub struct AstParser;

/// A parsed Rust file.
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub syntax_tree: syn::File,
}

/// Outcome of parsing many files: a bad file never stops the others.
#[derive(Debug, Default)]
pub struct ParseBatch {
    pub parsed: Vec<ParsedFile>,
    /// Files that could not be read or parsed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl ParsedFile {
    /// Number of struct and enum declarations, including those in inline modules.
    pub fn type_declaration_count(&self) -> usize {
        count_type_items(&self.syntax_tree.items)
    }
}

fn count_type_items(items: &[syn::Item]) -> usize {
    items
        .iter()
        .map(|item| match item {
            syn::Item::Struct(_) | syn::Item::Enum(_) => 1,
            syn::Item::Mod(module) => module
                .content
                .as_ref()
                .map_or(0, |(_, nested)| count_type_items(nested)),
            _ => 0,
        })
        .sum()
}

impl AstParser {
    /// Reads and parses a single source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid Rust.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let syntax_tree = syn::parse_file(&content)
            .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }

    /// Parses Rust source held in memory, labelling it with `label` for diagnostics.
    pub fn parse_source(label: &str, content: &str) -> Result<ParsedFile> {
        let syntax_tree = syn::parse_file(content)
            .with_context(|| format!("Failed to parse Rust syntax in {}", label))?;

        Ok(ParsedFile {
            path: PathBuf::from(label),
            syntax_tree,
        })
    }

    /// Parses every file, logging and collecting the failures.
    pub fn parse_files(paths: &[PathBuf]) -> ParseBatch {
        debug!("Parsing {} files", paths.len());

        let mut batch = ParseBatch::default();
        for path in paths {
            match Self::parse_file(path) {
                Ok(parsed) => batch.parsed.push(parsed),
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    batch.failed.push((path.clone(), format!("{:#}", e)));
                }
            }
        }

        debug!(
            "Parsing complete: {} succeeded, {} failed",
            batch.parsed.len(),
            batch.failed.len()
        );
        batch
    }
}
