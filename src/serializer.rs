//! Rendering documents as YAML or JSON and writing them out.
//!
//! The functions accept any serializable document, so both the assembled
//! [`OpenApiDocument`](crate::assembler::OpenApiDocument) and a per-request
//! [`ServedDocument`](crate::endpoint::ServedDocument) view go through the
//! same path.

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serializes a document to YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_yaml<T: Serialize + ?Sized>(doc: &T) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize OpenAPI document to YAML")
}

/// Serializes a document to pretty-printed JSON.
pub fn serialize_json<T: Serialize + ?Sized>(doc: &T) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    serde_json::to_string_pretty(doc).context("Failed to serialize OpenAPI document to JSON")
}

/// Writes `content` to `path`, creating parent directories as needed.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Info, OpenApiDocument};
    use crate::catalog::{FieldDef, TypeCatalog, TypeDef};
    use crate::descriptor::TypeRef;
    use crate::operation::HttpMethod;
    use crate::routes::{ApiBuilder, RouteDecl};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_document() -> OpenApiDocument {
        let catalog = TypeCatalog::new()
            .with(TypeDef::structure(
                "User",
                vec![
                    FieldDef::new("id", TypeRef::named("u32")),
                    FieldDef::new("name", TypeRef::named("String")),
                ],
            ))
            .with(TypeDef::structure(
                "UserPath",
                vec![FieldDef::new("id", TypeRef::named("u32"))],
            ));

        let mut builder = ApiBuilder::new(catalog).with_info(Info {
            title: "Test API".to_string(),
            version: "1.0.0".to_string(),
            description: Some("A test API".to_string()),
            contact: None,
        });
        builder
            .route(
                RouteDecl::get("/users").response(200, TypeRef::array(TypeRef::named("User"))),
                vec![],
            )
            .unwrap();
        builder
            .route(
                RouteDecl::get("/users/:id")
                    .params(TypeRef::named("UserPath"))
                    .response(200, TypeRef::named("User"))
                    .response(404, TypeRef::Unit),
                vec![],
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize_yaml(&create_test_document()).unwrap();

        assert!(yaml.contains("openapi: 3.0.0"));
        assert!(yaml.contains("title: Test API"));
        assert!(yaml.contains("/users/{id}:"));
        assert!(yaml.contains("get:"));
    }

    #[test]
    fn test_serialize_json_pretty_format() {
        let json = serialize_json(&create_test_document()).unwrap();

        assert!(json.lines().count() > 5, "JSON should be pretty-printed");
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["openapi"], "3.0.0");
        assert_eq!(
            parsed["paths"]["/users/{id}"]["get"]["parameters"][0]["in"],
            "path"
        );
    }

    #[test]
    fn test_paths_keep_registration_order() {
        let json = serialize_json(&create_test_document()).unwrap();
        let users = json.find("\"/users\"").unwrap();
        let user = json.find("\"/users/{id}\"").unwrap();
        assert!(users < user);
    }

    #[test]
    fn test_roundtrip_preserves_routes_and_schemas() {
        let doc = create_test_document();

        let from_json: OpenApiDocument =
            serde_json::from_str(&serialize_json(&doc).unwrap()).unwrap();
        let from_yaml: OpenApiDocument =
            serde_yaml::from_str(&serialize_yaml(&doc).unwrap()).unwrap();

        for parsed in [&from_json, &from_yaml] {
            let keys: Vec<_> = parsed.paths.keys().cloned().collect();
            assert_eq!(keys, vec!["/users".to_string(), "/users/{id}".to_string()]);
            assert!(parsed.paths["/users"].get.is_some());

            let names: Vec<_> = parsed
                .components
                .as_ref()
                .unwrap()
                .schemas
                .as_ref()
                .unwrap()
                .keys()
                .cloned()
                .collect();
            assert_eq!(names, vec!["User".to_string()]);

            let original = doc.operation(HttpMethod::Get, "/users/{id}").unwrap();
            let reparsed = parsed.paths["/users/{id}"].get.as_ref().unwrap();
            assert_eq!(reparsed.responses(), original.responses());
        }
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("subdir").join("nested").join("openapi.yaml");

        write_to_file("first", &file_path).unwrap();
        write_to_file("second", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "second");
    }

    #[test]
    fn test_write_json_file_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("openapi.json");

        let doc = create_test_document();
        write_to_file(&serialize_json(&doc).unwrap(), &file_path).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let deserialized: OpenApiDocument = serde_json::from_str(&content).unwrap();
        assert_eq!(deserialized.info.title, "Test API");
    }
}
