//! Route declaration and the [`ApiBuilder`] that turns routes into a document.
//!
//! Routes are registered once. Registration resolves the route's types,
//! binds its path template, runs every module and finalizes the operation
//! before returning, so a registered route is immutable from then on.
//! Scopes add a path prefix and modules that apply to every route declared
//! inside them.

use crate::assembler::{self, DocumentMeta, Info, OpenApiDocument, SecurityScheme, Server};
use crate::catalog::TypeCatalog;
use crate::descriptor::TypeRef;
use crate::error::{Error, Result};
use crate::modules::{
    GeneratorContext, ModuleProvider, OperationModule, ParameterModule, RequestModule,
    ResponseModule,
};
use crate::operation::{HttpMethod, Operation, OperationState};
use crate::path_template::{join_paths, route_key, PathTemplate};
use indexmap::IndexMap;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One response of a route declaration.
#[derive(Debug, Clone)]
pub struct ResponseDecl {
    pub status: u16,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub example: Option<serde_json::Value>,
}

/// The typed shape of a route: method, path, parameter, body and response types.
#[derive(Debug, Clone)]
pub struct RouteDecl {
    pub method: HttpMethod,
    pub path: String,
    pub params: TypeRef,
    pub request: Option<TypeRef>,
    pub request_example: Option<serde_json::Value>,
    pub responses: Vec<ResponseDecl>,
}

impl RouteDecl {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: TypeRef::Unit,
            request: None,
            request_example: None,
            responses: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn params(mut self, ty: TypeRef) -> Self {
        self.params = ty;
        self
    }

    pub fn request(mut self, ty: TypeRef) -> Self {
        self.request = Some(ty);
        self
    }

    pub fn request_example(mut self, example: serde_json::Value) -> Self {
        self.request_example = Some(example);
        self
    }

    pub fn response(mut self, status: u16, ty: TypeRef) -> Self {
        self.responses.push(ResponseDecl {
            status,
            ty,
            description: None,
            example: None,
        });
        self
    }

    /// Attaches an example to the most recently declared response.
    pub fn example(mut self, example: serde_json::Value) -> Self {
        if let Some(last) = self.responses.last_mut() {
            last.example = Some(example);
        }
        self
    }

    /// The modules implied by the declaration itself.
    fn implied_modules(&self, template: PathTemplate) -> Vec<Arc<dyn OperationModule>> {
        let mut modules: Vec<Arc<dyn OperationModule>> =
            vec![Arc::new(ParameterModule::new(template))];
        if let Some(request) = &self.request {
            let mut module = RequestModule::new(request.clone());
            module.example = self.request_example.clone();
            modules.push(Arc::new(module));
        }
        for response in &self.responses {
            let mut module = ResponseModule::new(response.status, response.ty.clone());
            module.description = response.description.clone();
            module.example = response.example.clone();
            modules.push(Arc::new(module));
        }
        modules
    }
}

struct Scope {
    prefix: String,
    modules: Vec<Arc<dyn OperationModule>>,
}

/// Collects routes and document metadata, then assembles the document.
pub struct ApiBuilder {
    ctx: GeneratorContext,
    meta: DocumentMeta,
    scopes: Vec<Scope>,
    /// `METHOD route-key` -> finalized operation, in registration order
    operations: IndexMap<String, Operation>,
}

impl ApiBuilder {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            ctx: GeneratorContext::new(catalog),
            meta: DocumentMeta::default(),
            scopes: Vec::new(),
            operations: IndexMap::new(),
        }
    }

    pub fn with_info(mut self, info: Info) -> Self {
        self.meta.info = info;
        self
    }

    pub fn with_server(mut self, server: Server) -> Self {
        self.meta.servers.push(server);
        self
    }

    pub fn with_security_scheme(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.meta.security_schemes.insert(name.into(), scheme);
        self
    }

    pub fn set_info(&mut self, info: Info) {
        self.meta.info = info;
    }

    pub fn add_server(&mut self, server: Server) {
        self.meta.servers.push(server);
    }

    pub fn add_security_scheme(&mut self, name: impl Into<String>, scheme: SecurityScheme) {
        self.meta.security_schemes.insert(name.into(), scheme);
    }

    pub fn context_mut(&mut self) -> &mut GeneratorContext {
        &mut self.ctx
    }

    /// Registers a route and finalizes its operation.
    ///
    /// Modules run in this order: those implied by the declaration
    /// (parameters, request, responses), then the modules of each enclosing
    /// scope from outermost to innermost, then `modules`.
    pub fn route(
        &mut self,
        decl: RouteDecl,
        modules: Vec<Arc<dyn OperationModule>>,
    ) -> Result<&Operation> {
        let full_path = self
            .scopes
            .iter()
            .map(|s| s.prefix.as_str())
            .chain(std::iter::once(decl.path.as_str()))
            .fold(String::new(), |acc, part| join_paths(&acc, part));

        let params = self.ctx.resolve(&decl.params)?;
        let template = PathTemplate::bind(&full_path, &params)?;
        let key = format!("{} {}", decl.method, template.route_key());
        if self.operations.contains_key(&key) {
            return Err(Error::DuplicateRoute {
                method: decl.method.to_string(),
                path: template.path(),
            });
        }

        let mut operation = Operation::new(decl.method, template.path());
        debug!("Configuring {}", operation.route());

        let scope_modules = self.scopes.iter().flat_map(|s| s.modules.iter().cloned());
        let all_modules: Vec<Arc<dyn OperationModule>> = decl
            .implied_modules(template)
            .into_iter()
            .chain(scope_modules)
            .chain(modules)
            .collect();

        // A failing module must not leave its schemas or tags behind
        let snapshot = self.ctx.snapshot();
        let provider = ModuleProvider::new(all_modules.clone());
        for module in &all_modules {
            if let Err(err) = module.configure(&mut self.ctx, &provider, &mut operation) {
                debug!("{} failed in module `{}`, rolling back", operation.route(), module.name());
                self.ctx.restore(snapshot);
                return Err(err);
            }
        }
        operation.finalize();

        info!("Registered {}", operation.route());
        let entry = self.operations.entry(key).or_insert(operation);
        Ok(entry)
    }

    /// Declares routes under `prefix`, each also configured by `modules`.
    pub fn scope<F>(
        &mut self,
        prefix: impl Into<String>,
        modules: Vec<Arc<dyn OperationModule>>,
        declare: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.scopes.push(Scope {
            prefix: prefix.into(),
            modules,
        });
        let result = declare(self);
        self.scopes.pop();
        result
    }

    /// Applies a module to a route that is already registered.
    ///
    /// Registered operations are finalized, so this always fails: with
    /// `FrozenOperation` for a known route, `InvalidArgument` otherwise.
    pub fn configure(
        &mut self,
        method: HttpMethod,
        path: &str,
        module: Arc<dyn OperationModule>,
    ) -> Result<()> {
        let key = format!("{} {}", method, route_key(&PathTemplate::parse(path)?));
        let operation = self.operations.get_mut(&key).ok_or_else(|| {
            Error::InvalidArgument(format!("no route registered for {} {}", method, path))
        })?;
        if operation.state() == OperationState::Finalized {
            return Err(Error::FrozenOperation {
                method: method.to_string(),
                path: operation.path().to_string(),
            });
        }
        module.configure(&mut self.ctx, &ModuleProvider::default(), operation)
    }

    pub fn operation(&self, method: HttpMethod, path: &str) -> Option<&Operation> {
        let key = format!("{} {}", method, route_key(&PathTemplate::parse(path).ok()?));
        self.operations.get(&key)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Assembles the document from everything registered so far.
    pub fn build(self) -> Result<OpenApiDocument> {
        let (registry, tags) = self.ctx.into_parts();
        let mut meta = self.meta;
        let mut declared: BTreeMap<String, usize> = meta
            .tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        for tag in tags {
            match declared.get(&tag.name) {
                Some(&i) if meta.tags[i].description.is_none() => {
                    meta.tags[i].description = tag.description
                }
                Some(_) => {}
                None => {
                    declared.insert(tag.name.clone(), meta.tags.len());
                    meta.tags.push(tag);
                }
            }
        }
        assembler::assemble(self.operations.into_values(), &registry, meta)
    }
}
