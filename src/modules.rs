//! Operation modules: the units that contribute facts to an operation.
//!
//! Each route is configured by a list of [`OperationModule`]s applied in
//! order. A module sees the shared [`GeneratorContext`] (type resolution,
//! schema registration, tag definitions) and a [`ModuleProvider`] that can
//! look up the sibling modules applied before it.

use crate::catalog::TypeCatalog;
use crate::descriptor::{TypeDescriptor, TypeRef};
use crate::error::Result;
use crate::operation::{
    MediaType, Operation, Parameter, ParameterLocation, RequestBody, Response,
};
use crate::path_template::PathTemplate;
use crate::schema_registry::{Schema, SchemaRegistry};
use crate::type_resolver::TypeResolver;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// OpenAPI Tag object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// State shared by every module of every route.
pub struct GeneratorContext {
    resolver: TypeResolver,
    registry: SchemaRegistry,
    tags: IndexMap<String, Tag>,
}

impl GeneratorContext {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            resolver: TypeResolver::new(catalog),
            registry: SchemaRegistry::new(),
            tags: IndexMap::new(),
        }
    }

    pub fn resolve(&mut self, ty: &TypeRef) -> Result<Arc<TypeDescriptor>> {
        self.resolver.resolve(ty)
    }

    /// Resolves `ty` and returns the schema to embed for it.
    pub fn schema_for(&mut self, ty: &TypeRef) -> Result<Schema> {
        let descriptor = self.resolver.resolve(ty)?;
        self.registry.register(&descriptor)
    }

    pub fn schema_for_descriptor(&mut self, descriptor: &TypeDescriptor) -> Result<Schema> {
        self.registry.register(descriptor)
    }

    /// Records a tag definition. The first description given for a name is kept.
    pub fn define_tag(&mut self, tag: &Tag) {
        match self.tags.get_mut(&tag.name) {
            None => {
                self.tags.insert(tag.name.clone(), tag.clone());
            }
            Some(existing) => match (&existing.description, &tag.description) {
                (None, Some(_)) => existing.description = tag.description.clone(),
                (Some(a), Some(b)) if a != b => {
                    warn!("Tag `{}` described twice, keeping the first", tag.name)
                }
                _ => {}
            },
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    /// Captures the registered schemas and tag definitions.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            registry: self.registry.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Drops everything registered since `snapshot` was taken. Resolved
    /// descriptors stay cached, they hold no registration state.
    pub fn restore(&mut self, snapshot: ContextSnapshot) {
        self.registry = snapshot.registry;
        self.tags = snapshot.tags;
    }

    pub fn into_parts(self) -> (SchemaRegistry, Vec<Tag>) {
        (self.registry, self.tags.into_values().collect())
    }
}

/// Saved registry and tag state of a [`GeneratorContext`].
pub struct ContextSnapshot {
    registry: SchemaRegistry,
    tags: IndexMap<String, Tag>,
}

/// Read-only view of every module configuring the current operation,
/// including those that run after the one being asked.
#[derive(Default)]
pub struct ModuleProvider {
    modules: Vec<Arc<dyn OperationModule>>,
}

impl ModuleProvider {
    pub fn new(modules: Vec<Arc<dyn OperationModule>>) -> Self {
        Self { modules }
    }

    /// Modules of concrete type `T`, in application order.
    pub fn of_type<T: OperationModule>(&self) -> impl Iterator<Item = &T> {
        self.modules
            .iter()
            .filter_map(|module| module.as_any().downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// A contributor to an [`Operation`].
pub trait OperationModule: Any + Send + Sync {
    /// Name reported when this module causes a conflict
    fn name(&self) -> &str;

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Summary, description and operation id.
#[derive(Debug, Clone, Default)]
pub struct InfoModule {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub operation_id: Option<String>,
}

impl InfoModule {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }
}

impl OperationModule for InfoModule {
    fn name(&self) -> &str {
        "info"
    }

    fn configure(
        &self,
        _ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        if let Some(summary) = &self.summary {
            operation.set_summary(self.name(), summary.as_str())?;
        }
        if let Some(description) = &self.description {
            operation.set_description(self.name(), description.as_str())?;
        }
        if let Some(id) = &self.operation_id {
            operation.set_operation_id(self.name(), id.as_str())?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Path and query parameters from a bound path template.
#[derive(Debug, Clone)]
pub struct ParameterModule {
    template: PathTemplate,
}

impl ParameterModule {
    pub fn new(template: PathTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }
}

impl OperationModule for ParameterModule {
    fn name(&self) -> &str {
        "parameters"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        let path_fields = self
            .template
            .path_params
            .iter()
            .map(|f| (f, ParameterLocation::Path));
        let query_fields = self
            .template
            .query_params
            .iter()
            .map(|f| (f, ParameterLocation::Query));

        for (field, location) in path_fields.chain(query_fields) {
            let schema = ctx.schema_for_descriptor(&field.descriptor)?;
            operation.add_parameter(
                self.name(),
                Parameter {
                    name: field.name.clone(),
                    location,
                    // a path segment is always present
                    required: location == ParameterLocation::Path || field.required,
                    description: field.description.clone(),
                    schema,
                },
            )?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A typed request header.
#[derive(Debug, Clone)]
pub struct HeaderModule {
    pub header: String,
    pub ty: TypeRef,
    pub required: bool,
    pub description: Option<String>,
}

impl HeaderModule {
    pub fn new(header: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            header: header.into(),
            ty,
            required: true,
            description: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl OperationModule for HeaderModule {
    fn name(&self) -> &str {
        "header"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        let schema = ctx.schema_for(&self.ty)?;
        operation.add_parameter(
            self.name(),
            Parameter {
                name: self.header.clone(),
                location: ParameterLocation::Header,
                required: self.required,
                description: self.description.clone(),
                schema,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The JSON request body.
#[derive(Debug, Clone)]
pub struct RequestModule {
    pub ty: TypeRef,
    pub description: Option<String>,
    pub example: Option<serde_json::Value>,
}

impl RequestModule {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            description: None,
            example: None,
        }
    }

    pub fn with_example(mut self, example: serde_json::Value) -> Self {
        self.example = Some(example);
        self
    }
}

impl OperationModule for RequestModule {
    fn name(&self) -> &str {
        "request"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        let descriptor = ctx.resolve(&self.ty)?;
        if *descriptor == TypeDescriptor::Unit {
            debug!("{}: unit request type, no body", operation.route());
            return Ok(());
        }
        let schema = ctx.schema_for_descriptor(&descriptor)?;
        operation.set_request_body(
            self.name(),
            RequestBody {
                description: self.description.clone().or_else(|| type_description(&descriptor)),
                required: true,
                content: MediaType::json(schema, self.example.clone()),
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A declared response for one status code.
#[derive(Debug, Clone)]
pub struct ResponseModule {
    pub status: u16,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub example: Option<serde_json::Value>,
}

impl ResponseModule {
    pub fn new(status: u16, ty: TypeRef) -> Self {
        Self {
            status,
            ty,
            description: None,
            example: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_example(mut self, example: serde_json::Value) -> Self {
        self.example = Some(example);
        self
    }
}

impl OperationModule for ResponseModule {
    fn name(&self) -> &str {
        "response"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        let response = build_response(ctx, &self.ty, self.status, &self.description, &self.example)?;
        operation.add_response(self.name(), self.status, response)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tags for the operation, with their definitions.
#[derive(Debug, Clone, Default)]
pub struct TagModule {
    pub tags: Vec<Tag>,
}

impl TagModule {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: names.into_iter().map(Tag::new).collect(),
        }
    }

    pub fn with_tags(tags: Vec<Tag>) -> Self {
        Self { tags }
    }
}

impl OperationModule for TagModule {
    fn name(&self) -> &str {
        "tags"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        for tag in &self.tags {
            ctx.define_tag(tag);
        }
        operation.add_tags(self.tags.iter().map(|t| t.name.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A security requirement with the scopes it needs.
#[derive(Debug, Clone)]
pub struct SecurityModule {
    pub scheme: String,
    pub scopes: Vec<String>,
}

impl SecurityModule {
    pub fn new<I, S>(scheme: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scheme: scheme.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

impl OperationModule for SecurityModule {
    fn name(&self) -> &str {
        "security"
    }

    fn configure(
        &self,
        _ctx: &mut GeneratorContext,
        _provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        operation.add_security(&self.scheme, self.scopes.iter().cloned())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An error response produced when a handler fails.
///
/// A status already declared by a sibling [`ResponseModule`] is left alone,
/// so a route can override a scope-wide error mapping.
#[derive(Debug, Clone)]
pub struct ExceptionModule {
    pub status: u16,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub example: Option<serde_json::Value>,
}

impl ExceptionModule {
    pub fn new(status: u16, ty: TypeRef) -> Self {
        Self {
            status,
            ty,
            description: None,
            example: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl OperationModule for ExceptionModule {
    fn name(&self) -> &str {
        "exception"
    }

    fn configure(
        &self,
        ctx: &mut GeneratorContext,
        provider: &ModuleProvider,
        operation: &mut Operation,
    ) -> Result<()> {
        if provider
            .of_type::<ResponseModule>()
            .any(|r| r.status == self.status)
        {
            debug!(
                "{}: status {} declared explicitly, skipping exception mapping",
                operation.route(),
                self.status
            );
            return Ok(());
        }
        let response = build_response(ctx, &self.ty, self.status, &self.description, &self.example)?;
        operation.add_response(self.name(), self.status, response)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn build_response(
    ctx: &mut GeneratorContext,
    ty: &TypeRef,
    status: u16,
    description: &Option<String>,
    example: &Option<serde_json::Value>,
) -> Result<Response> {
    let descriptor = ctx.resolve(ty)?;
    let description = description
        .clone()
        .or_else(|| type_description(&descriptor))
        .unwrap_or_else(|| status_reason(status).to_string());

    if *descriptor == TypeDescriptor::Unit {
        return Ok(Response {
            description,
            content: None,
        });
    }
    let schema = ctx.schema_for_descriptor(&descriptor)?;
    Ok(Response {
        description,
        content: Some(MediaType::json(schema, example.clone())),
    })
}

fn type_description(descriptor: &TypeDescriptor) -> Option<String> {
    match descriptor {
        TypeDescriptor::Object(object) => object.description.clone(),
        TypeDescriptor::Union(union) => union.description.clone(),
        TypeDescriptor::Enum(e) => e.description.clone(),
        _ => None,
    }
}

/// Reason phrase used when nothing better describes a response.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        100..=199 => "Informational",
        200..=299 => "Success",
        300..=399 => "Redirection",
        400..=499 => "Client Error",
        _ => "Server Error",
    }
}
