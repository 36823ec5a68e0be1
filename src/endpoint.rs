//! Serving the assembled document.
//!
//! The document is built once and shared. Each request gets a view of it
//! whose server list starts with the origin the request came in on; the
//! shared document itself is never modified.

use crate::assembler::{Components, Info, OpenApiDocument, PathItem, Server};
use crate::error::{Error, Result};
use crate::modules::Tag;
use indexmap::IndexMap;
use log::debug;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

pub const DEFAULT_DOCUMENT_PATH: &str = "/openapi.json";
pub const DEFAULT_VIEWER_PATH: &str = "/swagger-ui/index.html";

/// Where a request was received: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl RequestOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Parses `scheme://host[:port]`. Without a port, the scheme's default is used.
    ///
    /// IPv6 hosts are written in brackets (`http://[::1]:8080`) and keep them.
    pub fn parse(origin: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid origin `{}`", origin));
        let (scheme, rest) = origin.split_once("://").ok_or_else(invalid)?;
        let authority = rest.trim_end_matches('/');
        if scheme.is_empty() || authority.is_empty() || authority.contains('/') {
            return Err(invalid());
        }

        let (host, port) = if authority.starts_with('[') {
            let end = authority.find(']').ok_or_else(invalid)?;
            let (host, tail) = authority.split_at(end + 1);
            let port = match tail {
                "" => None,
                tail => Some(tail.strip_prefix(':').ok_or_else(invalid)?),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        if host.is_empty() || host == "[]" || (!host.starts_with('[') && host.contains(':')) {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => default_port(scheme).ok_or_else(invalid)?,
        };
        Ok(Self::new(scheme, host, port))
    }

    /// `scheme://host[:port]`, omitting the port when it is 80 or 443.
    pub fn server_url(&self) -> String {
        match self.port {
            80 | 443 => format!("{}://{}", self.scheme, self.host),
            port => format!("{}://{}:{}", self.scheme, self.host, port),
        }
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// A borrowed view of the document as served to one request.
#[derive(Debug, Serialize)]
pub struct ServedDocument<'a> {
    pub openapi: &'a str,
    pub info: &'a Info,
    pub servers: Vec<Cow<'a, Server>>,
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a [Tag],
    pub paths: &'a IndexMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<&'a Components>,
}

fn no_tags(tags: &&[Tag]) -> bool {
    tags.is_empty()
}

/// Serves the shared document and the viewer redirect.
#[derive(Debug, Clone)]
pub struct DocumentEndpoint {
    document: Arc<OpenApiDocument>,
    document_path: String,
    viewer_path: String,
}

impl DocumentEndpoint {
    pub fn new(document: Arc<OpenApiDocument>) -> Self {
        Self {
            document,
            document_path: DEFAULT_DOCUMENT_PATH.to_string(),
            viewer_path: DEFAULT_VIEWER_PATH.to_string(),
        }
    }

    pub fn with_paths(
        mut self,
        document_path: impl Into<String>,
        viewer_path: impl Into<String>,
    ) -> Self {
        self.document_path = document_path.into();
        self.viewer_path = viewer_path.into();
        self
    }

    pub fn document(&self) -> &Arc<OpenApiDocument> {
        &self.document
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    /// The document with `origin` as its first server.
    pub fn view(&self, origin: &RequestOrigin) -> ServedDocument<'_> {
        let document = self.document.as_ref();
        let url = origin.server_url();

        let mut servers: Vec<Cow<'_, Server>> = Vec::with_capacity(document.servers.len() + 1);
        servers.push(Cow::Owned(Server::new(url.as_str())));
        servers.extend(
            document
                .servers
                .iter()
                .filter(|s| s.url != url)
                .map(Cow::Borrowed),
        );

        ServedDocument {
            openapi: &document.openapi,
            info: &document.info,
            servers,
            tags: &document.tags,
            paths: &document.paths,
            components: document.components.as_ref(),
        }
    }

    /// JSON body for a request to the document path.
    pub fn serve_json(&self, origin: &RequestOrigin) -> Result<String> {
        debug!("Serving {} for {}", self.document_path, origin.server_url());
        Ok(serde_json::to_string_pretty(&self.view(origin))?)
    }

    /// Target of the redirect from `/` to the documentation viewer.
    pub fn redirect_location(&self) -> String {
        format!("{}?url={}", self.viewer_path, self.document_path)
    }
}
