//! The per-route operation under construction.
//!
//! An [`Operation`] starts `Declared`, moves to `Accumulating` on the first
//! module write, and becomes `Finalized` once the route has been fully
//! configured. Every mutator checks the state first, so a finalized
//! operation can never change. Singular fields may be written once; tags
//! and security scopes merge.

use crate::error::{Error, Result};
use crate::schema_registry::Schema;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Content type used for request and response bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP methods an operation can be bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Case-insensitive parse of a method name.
    pub fn parse(method: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(method))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown HTTP method `{}`", method)))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationState {
    #[default]
    Declared,
    Accumulating,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI Response object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

impl MediaType {
    pub fn json(schema: Schema, example: Option<serde_json::Value>) -> BTreeMap<String, Self> {
        BTreeMap::from([(JSON_CONTENT_TYPE.to_string(), Self { schema, example })])
    }
}

/// OpenAPI Operation object, plus the route identity and build state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(skip)]
    method: HttpMethod,
    #[serde(skip)]
    path: String,
    #[serde(skip)]
    state: OperationState,

    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    operation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    request_body: Option<RequestBody>,
    responses: BTreeMap<String, Response>,
    /// One requirement object: scheme name -> scopes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    security: Vec<BTreeMap<String, BTreeSet<String>>>,
}

impl Operation {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            state: OperationState::Declared,
            tags: BTreeSet::new(),
            summary: None,
            description: None,
            operation_id: None,
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            security: Vec::new(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// `METHOD /path`, used in diagnostics
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn request_body(&self) -> Option<&RequestBody> {
        self.request_body.as_ref()
    }

    pub fn responses(&self) -> &BTreeMap<String, Response> {
        &self.responses
    }

    /// Scopes requested per security scheme.
    pub fn security(&self) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        self.security.first()
    }

    /// Body examples keyed by `request` or by response status.
    pub fn examples(&self) -> BTreeMap<String, &serde_json::Value> {
        let request = self
            .request_body
            .iter()
            .flat_map(|body| body.content.values())
            .filter_map(|media| media.example.as_ref())
            .map(|example| ("request".to_string(), example));
        let responses = self.responses.iter().flat_map(|(status, response)| {
            response
                .content
                .iter()
                .flat_map(|content| content.values())
                .filter_map(move |media| media.example.as_ref().map(|e| (status.clone(), e)))
        });
        request.chain(responses).collect()
    }

    /// Every schema this operation embeds.
    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        let parameters = self.parameters.iter().map(|p| &p.schema);
        let request = self
            .request_body
            .iter()
            .flat_map(|body| body.content.values())
            .map(|media| &media.schema);
        let responses = self
            .responses
            .values()
            .flat_map(|response| response.content.iter().flat_map(|c| c.values()))
            .map(|media| &media.schema);
        parameters.chain(request).chain(responses)
    }

    pub fn set_summary(&mut self, module: &str, summary: impl Into<String>) -> Result<()> {
        self.begin_write()?;
        let route = self.route();
        write_once(&mut self.summary, summary.into(), &route, "summary", module)
    }

    pub fn set_description(&mut self, module: &str, description: impl Into<String>) -> Result<()> {
        self.begin_write()?;
        let route = self.route();
        write_once(&mut self.description, description.into(), &route, "description", module)
    }

    pub fn set_operation_id(&mut self, module: &str, id: impl Into<String>) -> Result<()> {
        self.begin_write()?;
        let route = self.route();
        write_once(&mut self.operation_id, id.into(), &route, "operationId", module)
    }

    pub fn set_request_body(&mut self, module: &str, body: RequestBody) -> Result<()> {
        self.begin_write()?;
        let route = self.route();
        write_once(&mut self.request_body, body, &route, "requestBody", module)
    }

    /// Adds a parameter; a second parameter with the same name and location
    /// is a conflict.
    pub fn add_parameter(&mut self, module: &str, parameter: Parameter) -> Result<()> {
        self.begin_write()?;
        let clash = self
            .parameters
            .iter()
            .any(|p| p.name == parameter.name && p.location == parameter.location);
        if clash {
            return Err(self.conflict(&format!("parameter `{}`", parameter.name), module));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Adds the response for `status`; each status may be declared once.
    pub fn add_response(&mut self, module: &str, status: u16, response: Response) -> Result<()> {
        self.begin_write()?;
        let key = status.to_string();
        if self.responses.contains_key(&key) {
            return Err(self.conflict(&format!("response {}", key), module));
        }
        self.responses.insert(key, response);
        Ok(())
    }

    pub fn add_tags<I, S>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.begin_write()?;
        self.tags.extend(tags.into_iter().map(Into::into));
        Ok(())
    }

    /// Requests `scopes` of `scheme`, merging with earlier requests.
    pub fn add_security<I, S>(&mut self, scheme: &str, scopes: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.begin_write()?;
        if self.security.is_empty() {
            self.security.push(BTreeMap::new());
        }
        self.security[0]
            .entry(scheme.to_string())
            .or_default()
            .extend(scopes.into_iter().map(Into::into));
        Ok(())
    }

    /// Freezes the operation. Finalizing twice is a no-op.
    pub fn finalize(&mut self) {
        if self.state != OperationState::Finalized {
            debug!("Finalized {}", self.route());
            self.state = OperationState::Finalized;
        }
    }

    fn begin_write(&mut self) -> Result<()> {
        match self.state {
            OperationState::Finalized => Err(Error::FrozenOperation {
                method: self.method.to_string(),
                path: self.path.clone(),
            }),
            OperationState::Declared => {
                self.state = OperationState::Accumulating;
                Ok(())
            }
            OperationState::Accumulating => Ok(()),
        }
    }

    fn conflict(&self, field: &str, module: &str) -> Error {
        Error::ModuleConflict {
            route: self.route(),
            field: field.to_string(),
            module: module.to_string(),
        }
    }
}

fn write_once<T>(
    slot: &mut Option<T>,
    value: T,
    route: &str,
    field: &str,
    module: &str,
) -> Result<()> {
    if slot.is_some() {
        return Err(Error::ModuleConflict {
            route: route.to_string(),
            field: field.to_string(),
            module: module.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}
