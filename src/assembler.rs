//! OpenAPI document types and the final assembly pass.
//!
//! [`assemble`] takes the finalized operations and the schema registry and
//! produces an [`OpenApiDocument`]. It is the only place a document is
//! created, and it refuses to produce one that would contain a dangling
//! schema reference, an undeclared security scheme, an unfinished forward
//! reference or two operations for the same route.

use crate::error::{Error, ResolutionErrorKind, Result};
use crate::modules::Tag;
use crate::operation::{HttpMethod, Operation, OperationState};
use crate::path_template::{route_key, PathTemplate};
use crate::schema_registry::{Schema, SchemaName, SchemaRegistry, SCHEMA_REF_PREFIX};
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const OPENAPI_VERSION: &str = "3.0.0";

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            contact: None,
        }
    }
}

/// OpenAPI Contact object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// OpenAPI Server object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: None,
        }
    }
}

/// OpenAPI Security Scheme object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        flows: OAuthFlows,
    },
    #[serde(rename = "http")]
    Http {
        scheme: String,
        #[serde(rename = "bearerFormat", skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
    },
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthFlows {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implicit: Option<OAuthFlow>,
    #[serde(rename = "authorizationCode", skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<OAuthFlow>,
    #[serde(rename = "clientCredentials", skip_serializing_if = "Option::is_none")]
    pub client_credentials: Option<OAuthFlow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<OAuthFlow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthFlow {
    #[serde(rename = "authorizationUrl", skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(rename = "tokenUrl", skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Scope name -> description
    #[serde(default)]
    pub scopes: BTreeMap<String, String>,
}

/// OpenAPI PathItem object: the operations bound to one path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    pub fn slot_mut(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    pub fn get_operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = (HttpMethod, &Operation)> {
        HttpMethod::ALL
            .into_iter()
            .filter_map(|method| self.get_operation(method).map(|op| (method, op)))
    }
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<BTreeMap<SchemaName, Schema>>,
    #[serde(rename = "securitySchemes", skip_serializing_if = "Option::is_none")]
    pub security_schemes: Option<BTreeMap<String, SecurityScheme>>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
    pub paths: IndexMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiDocument {
    pub fn operation(&self, method: HttpMethod, path: &str) -> Option<&Operation> {
        self.paths.get(path).and_then(|item| item.get_operation(method))
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.components
            .as_ref()
            .and_then(|c| c.schemas.as_ref())
            .and_then(|schemas| schemas.get(name))
    }
}

/// Document-level facts that do not come from routes.
#[derive(Debug, Clone, Default)]
pub struct DocumentMeta {
    pub info: Info,
    pub servers: Vec<Server>,
    pub tags: Vec<Tag>,
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

/// Builds the document from finalized operations.
pub fn assemble(
    operations: impl IntoIterator<Item = Operation>,
    registry: &SchemaRegistry,
    meta: DocumentMeta,
) -> Result<OpenApiDocument> {
    debug!("Assembling OpenAPI document");

    if let Some((name, pending)) = registry.unresolved().into_iter().next() {
        debug!("Schema {} still points at {}", name, pending);
        return Err(Error::resolution(
            pending,
            ResolutionErrorKind::UnresolvableRecursion,
        ));
    }

    let schemas = registry.schemas();
    for (name, schema) in schemas {
        check_references(schema, schemas, &format!("schema {}", name))?;
    }

    let mut paths: IndexMap<String, PathItem> = IndexMap::new();
    let mut seen = HashSet::new();
    for operation in operations {
        let route = operation.route();
        if operation.state() != OperationState::Finalized {
            return Err(Error::InvalidArgument(format!(
                "operation {} was never finalized",
                route
            )));
        }

        let key = route_key(&PathTemplate::parse(operation.path())?);
        if !seen.insert((operation.method(), key)) {
            return Err(Error::DuplicateRoute {
                method: operation.method().to_string(),
                path: operation.path().to_string(),
            });
        }

        for schema in operation.schemas() {
            check_references(schema, schemas, &route)?;
        }
        if let Some(requirements) = operation.security() {
            for scheme in requirements.keys() {
                if !meta.security_schemes.contains_key(scheme) {
                    return Err(Error::UndeclaredSecurityScheme {
                        scheme: scheme.clone(),
                        route: route.clone(),
                    });
                }
            }
        }

        let method = operation.method();
        let item = paths.entry(operation.path().to_string()).or_default();
        *item.slot_mut(method) = Some(operation);
    }

    let components = if schemas.is_empty() && meta.security_schemes.is_empty() {
        None
    } else {
        Some(Components {
            schemas: (!schemas.is_empty()).then(|| schemas.clone()),
            security_schemes: (!meta.security_schemes.is_empty())
                .then_some(meta.security_schemes),
        })
    };

    info!(
        "Assembled {} path(s) with {} component schema(s)",
        paths.len(),
        schemas.len()
    );
    Ok(OpenApiDocument {
        openapi: OPENAPI_VERSION.to_string(),
        info: meta.info,
        servers: meta.servers,
        tags: meta.tags,
        paths,
        components,
    })
}

fn check_references(
    schema: &Schema,
    schemas: &BTreeMap<SchemaName, Schema>,
    location: &str,
) -> Result<()> {
    let mut dangling = None;
    schema.visit_references(&mut |reference| {
        let known = reference
            .strip_prefix(SCHEMA_REF_PREFIX)
            .is_some_and(|name| schemas.contains_key(name));
        if !known && dangling.is_none() {
            dangling = Some(reference.to_string());
        }
    });
    match dangling {
        Some(reference) => Err(Error::DanglingSchemaReference {
            reference,
            location: location.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, ObjectDescriptor, PrimitiveType, TypeDescriptor, TypeName};
    use crate::operation::{MediaType, Response};
    use pretty_assertions::assert_eq;

    fn finalized(method: HttpMethod, path: &str, schema: Option<Schema>) -> Operation {
        let mut op = Operation::new(method, path);
        op.add_response(
            "response",
            200,
            Response {
                description: "OK".to_string(),
                content: schema.map(|s| MediaType::json(s, None)),
            },
        )
        .unwrap();
        op.finalize();
        op
    }

    fn registry_with_user() -> SchemaRegistry {
        let mut object = ObjectDescriptor::new(TypeName::plain("User"));
        object.fields = vec![FieldDescriptor::new(
            "name",
            TypeDescriptor::Primitive(PrimitiveType::String),
        )];
        let mut registry = SchemaRegistry::new();
        registry.register(&TypeDescriptor::Object(object)).unwrap();
        registry
    }

    #[test]
    fn test_assemble_groups_methods_by_path() {
        let registry = registry_with_user();
        let document = assemble(
            vec![
                finalized(HttpMethod::Get, "/users", Some(Schema::reference("User"))),
                finalized(HttpMethod::Post, "/users", None),
                finalized(HttpMethod::Get, "/health", None),
            ],
            &registry,
            DocumentMeta::default(),
        )
        .unwrap();

        assert_eq!(document.openapi, "3.0.0");
        assert_eq!(document.paths.len(), 2);
        let methods: Vec<_> = document.paths["/users"].operations().map(|(m, _)| m).collect();
        assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Post]);
        assert!(document.schema("User").is_some());
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let registry = registry_with_user();
        let err = assemble(
            vec![finalized(HttpMethod::Get, "/x", Some(Schema::reference("Ghost")))],
            &registry,
            DocumentMeta::default(),
        )
        .unwrap_err();
        match err {
            Error::DanglingSchemaReference { reference, location } => {
                assert_eq!(reference, "#/components/schemas/Ghost");
                assert_eq!(location, "GET /x");
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_route_ignores_parameter_names() {
        let err = assemble(
            vec![
                finalized(HttpMethod::Get, "/users/{id}", None),
                finalized(HttpMethod::Get, "/users/{uid}", None),
            ],
            &SchemaRegistry::new(),
            DocumentMeta::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));
    }

    #[test]
    fn test_undeclared_security_scheme() {
        let mut op = Operation::new(HttpMethod::Get, "/secret");
        op.add_security("oauth", ["read"]).unwrap();
        op.finalize();

        let err = assemble(vec![op.clone()], &SchemaRegistry::new(), DocumentMeta::default())
            .unwrap_err();
        assert!(matches!(err, Error::UndeclaredSecurityScheme { scheme, .. } if scheme == "oauth"));

        let meta = DocumentMeta {
            security_schemes: BTreeMap::from([(
                "oauth".to_string(),
                SecurityScheme::OAuth2 {
                    description: None,
                    flows: OAuthFlows::default(),
                },
            )]),
            ..DocumentMeta::default()
        };
        let document = assemble(vec![op], &SchemaRegistry::new(), meta).unwrap();
        let components = document.components.unwrap();
        assert!(components.schemas.is_none());
        assert!(components.security_schemes.unwrap().contains_key("oauth"));
    }

    #[test]
    fn test_unfinalized_operation_is_rejected() {
        let op = Operation::new(HttpMethod::Get, "/draft");
        assert!(assemble(vec![op], &SchemaRegistry::new(), DocumentMeta::default()).is_err());
    }

    #[test]
    fn test_security_scheme_serialization() {
        let scheme = SecurityScheme::Http {
            scheme: "bearer".to_string(),
            bearer_format: Some("JWT".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&scheme).unwrap(),
            serde_json::json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
        );
    }
}
