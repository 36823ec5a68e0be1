//! API manifest: the route declarations and document metadata for a build.
//!
//! The manifest is a YAML (or JSON) file. Types are written as Rust type
//! expressions, e.g. `Page<User>` or `Option<String>`, and are looked up in
//! the catalog collected from the project sources.
//!
//! ```yaml
//! info:
//!   title: Pet Store
//!   version: 1.0.0
//! exceptions:
//!   - status: 500
//!     type: ApiError
//! routes:
//!   - method: get
//!     path: /pets/{id}
//!     params: PetPath
//!     responses:
//!       200:
//!         type: Pet
//! ```

use crate::assembler::{Info, SecurityScheme, Server};
use crate::catalog::TypeCatalog;
use crate::descriptor::TypeRef;
use crate::error::Result;
use crate::modules::{
    ExceptionModule, HeaderModule, InfoModule, OperationModule, SecurityModule, Tag, TagModule,
};
use crate::operation::HttpMethod;
use crate::routes::{ApiBuilder, ResponseDecl, RouteDecl};
use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiManifest {
    #[serde(default)]
    pub info: Info,
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Error responses added to every route
    #[serde(default)]
    pub exceptions: Vec<ExceptionEntry>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub scopes: Vec<ScopeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionEntry {
    pub status: u16,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityEntry {
    pub scheme: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    #[serde(rename = "type", default = "default_header_type")]
    pub ty: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEntry {
    /// Body type; absent for an empty body
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub example: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub request_example: Option<serde_json::Value>,
    #[serde(default)]
    pub responses: BTreeMap<u16, ResponseEntry>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub security: Vec<SecurityEntry>,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeEntry {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub security: Vec<SecurityEntry>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub scopes: Vec<ScopeEntry>,
}

fn default_header_type() -> String {
    "String".to_string()
}

fn default_true() -> bool {
    true
}

impl ApiManifest {
    /// Reads a manifest file. `.json` files are read as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        debug!("Reading manifest: {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let manifest = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON manifest: {}", path.display()))?
        } else {
            Self::from_yaml_str(&content)
                .with_context(|| format!("Invalid YAML manifest: {}", path.display()))?
        };
        Ok(manifest)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Builds an [`ApiBuilder`] over `catalog` with every route registered.
    pub fn into_builder(self, catalog: TypeCatalog) -> Result<ApiBuilder> {
        let mut builder = ApiBuilder::new(catalog);
        builder.set_info(self.info.clone());
        for server in &self.servers {
            builder.add_server(server.clone());
        }
        for (name, scheme) in &self.security_schemes {
            builder.add_security_scheme(name.clone(), scheme.clone());
        }
        for tag in &self.tags {
            builder.context_mut().define_tag(tag);
        }

        let exceptions = self
            .exceptions
            .iter()
            .map(|e| {
                let mut module = ExceptionModule::new(e.status, TypeRef::parse(&e.ty)?);
                module.description = e.description.clone();
                Ok(Arc::new(module) as Arc<dyn OperationModule>)
            })
            .collect::<Result<Vec<_>>>()?;

        let root = ScopeEntry {
            prefix: String::new(),
            tags: Vec::new(),
            security: Vec::new(),
            routes: self.routes.clone(),
            scopes: self.scopes.clone(),
        };
        builder.scope("", exceptions, |b| self.declare_scope(b, &root))?;

        info!("Registered {} route(s) from manifest", builder.len());
        Ok(builder)
    }

    fn declare_scope(&self, builder: &mut ApiBuilder, scope: &ScopeEntry) -> Result<()> {
        for route in &scope.routes {
            let (decl, modules) = self.route_parts(route)?;
            builder.route(decl, modules)?;
        }
        for nested in &scope.scopes {
            let mut modules: Vec<Arc<dyn OperationModule>> = Vec::new();
            if !nested.tags.is_empty() {
                modules.push(Arc::new(TagModule::with_tags(self.tags_named(&nested.tags))));
            }
            modules.extend(security_modules(&nested.security));
            builder.scope(nested.prefix.clone(), modules, |b| self.declare_scope(b, nested))?;
        }
        Ok(())
    }

    fn route_parts(&self, route: &RouteEntry) -> Result<(RouteDecl, Vec<Arc<dyn OperationModule>>)> {
        let mut decl = RouteDecl::new(route.method, route.path.clone());
        if let Some(params) = &route.params {
            decl.params = TypeRef::parse(params)?;
        }
        if let Some(request) = &route.request {
            decl.request = Some(TypeRef::parse(request)?);
            decl.request_example = route.request_example.clone();
        }
        for (status, response) in &route.responses {
            let ty = match &response.ty {
                Some(ty) => TypeRef::parse(ty)?,
                None => TypeRef::Unit,
            };
            decl.responses.push(ResponseDecl {
                status: *status,
                ty,
                description: response.description.clone(),
                example: response.example.clone(),
            });
        }

        let mut modules: Vec<Arc<dyn OperationModule>> = Vec::new();
        if route.summary.is_some() || route.description.is_some() || route.operation_id.is_some() {
            modules.push(Arc::new(InfoModule {
                summary: route.summary.clone(),
                description: route.description.clone(),
                operation_id: route.operation_id.clone(),
            }));
        }
        if !route.tags.is_empty() {
            modules.push(Arc::new(TagModule::with_tags(self.tags_named(&route.tags))));
        }
        modules.extend(security_modules(&route.security));
        for header in &route.headers {
            let mut module = HeaderModule::new(header.name.clone(), TypeRef::parse(&header.ty)?);
            module.required = header.required;
            module.description = header.description.clone();
            modules.push(Arc::new(module));
        }
        Ok((decl, modules))
    }

    /// Tags by name, carrying the description declared at the top level.
    fn tags_named(&self, names: &[String]) -> Vec<Tag> {
        names
            .iter()
            .map(|name| {
                self.tags
                    .iter()
                    .find(|t| &t.name == name)
                    .cloned()
                    .unwrap_or_else(|| Tag::new(name.clone()))
            })
            .collect()
    }
}

fn security_modules(entries: &[SecurityEntry]) -> Vec<Arc<dyn OperationModule>> {
    entries
        .iter()
        .map(|s| {
            Arc::new(SecurityModule::new(s.scheme.clone(), s.scopes.iter().cloned()))
                as Arc<dyn OperationModule>
        })
        .collect()
}
