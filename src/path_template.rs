//! Route path templates and their binding to path-parameter types.
//!
//! A path such as `/users/{id}/posts` is split into literal and parameter
//! segments. Binding matches each `{name}` against a field of the route's
//! path-parameter type; fields that no segment consumes become query
//! parameters.

use crate::descriptor::{FieldDescriptor, TypeDescriptor};
use crate::error::{Error, Result};
use log::debug;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path bound to the fields of its parameter type.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    pub segments: Vec<Segment>,
    /// Fields consumed by `{name}` segments, in path order
    pub path_params: Vec<FieldDescriptor>,
    /// Remaining fields of the parameter type, in declaration order
    pub query_params: Vec<FieldDescriptor>,
}

impl PathTemplate {
    /// Splits a path into segments.
    ///
    /// Leading, trailing and repeated slashes are ignored, and axum-style
    /// `:name` segments are read as `{name}`.
    pub fn parse(path: &str) -> Result<Vec<Segment>> {
        let malformed = |message: String| Error::MalformedPath {
            path: path.to_string(),
            message,
        };

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let param = if let Some(inner) = part.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| malformed(format!("unclosed `{{` in `{}`", part)))?;
                Some(name)
            } else if let Some(name) = part.strip_prefix(':') {
                Some(name)
            } else if part.contains('{') || part.contains('}') {
                return Err(malformed(format!(
                    "`{}` mixes literal text with a parameter",
                    part
                )));
            } else {
                None
            };

            match param {
                Some(name) => {
                    let valid = !name.is_empty()
                        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
                    if !valid {
                        return Err(malformed(format!("invalid parameter name `{}`", name)));
                    }
                    if !seen.insert(name.to_string()) {
                        return Err(malformed(format!("parameter `{}` appears twice", name)));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }
        Ok(segments)
    }

    /// Parses `path` and binds its placeholders to the fields of `params`.
    ///
    /// `params` is the resolved path-parameter type: an object, or unit for
    /// routes without parameters.
    pub fn bind(path: &str, params: &TypeDescriptor) -> Result<Self> {
        let segments = Self::parse(path)?;

        let fields: &[FieldDescriptor] = match params {
            TypeDescriptor::Unit => &[],
            TypeDescriptor::Object(object) => &object.fields,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "parameters of `{}` must be a struct, found {:?}",
                    path, other
                )))
            }
        };

        let mut path_params = Vec::new();
        for segment in &segments {
            if let Segment::Param(name) = segment {
                let field = fields.iter().find(|f| &f.name == name).ok_or_else(|| {
                    Error::UnboundPathParameter {
                        path: path.to_string(),
                        name: name.clone(),
                    }
                })?;
                path_params.push(field.clone());
            }
        }

        let query_params: Vec<FieldDescriptor> = fields
            .iter()
            .filter(|f| !path_params.iter().any(|p| p.name == f.name))
            .cloned()
            .collect();

        debug!(
            "Bound {}: {} path parameter(s), {} query parameter(s)",
            path,
            path_params.len(),
            query_params.len()
        );
        Ok(Self {
            segments,
            path_params,
            query_params,
        })
    }

    /// Canonical OpenAPI form, e.g. `/users/{id}`.
    pub fn path(&self) -> String {
        render(&self.segments, |name| format!("{{{}}}", name))
    }

    /// Route identity: the path with parameter names erased, so
    /// `/users/{id}` and `/users/{uid}` are the same route.
    pub fn route_key(&self) -> String {
        route_key(&self.segments)
    }
}

pub fn route_key(segments: &[Segment]) -> String {
    render(segments, |_| "{}".to_string())
}

fn render(segments: &[Segment], param: impl Fn(&str) -> String) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(text) => format!("/{}", text),
            Segment::Param(name) => format!("/{}", param(name)),
        })
        .collect()
}

/// Joins a scope prefix and a route path.
pub fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => format!("/{}", prefix),
        (false, false) => format!("/{}/{}", prefix, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ObjectDescriptor, PrimitiveType, TypeName};

    fn params(fields: &[(&str, PrimitiveType)]) -> TypeDescriptor {
        let mut object = ObjectDescriptor::new(TypeName::plain("Params"));
        object.fields = fields
            .iter()
            .map(|(name, primitive)| {
                FieldDescriptor::new(*name, TypeDescriptor::Primitive(*primitive))
            })
            .collect();
        TypeDescriptor::Object(object)
    }

    #[test]
    fn test_single_path_parameter() {
        let template =
            PathTemplate::bind("string/{a}", &params(&[("a", PrimitiveType::String)])).unwrap();

        assert_eq!(template.path(), "/string/{a}");
        assert_eq!(template.path_params.len(), 1);
        assert_eq!(template.path_params[0].name, "a");
        assert!(template.query_params.is_empty());
    }

    #[test]
    fn test_unconsumed_field_becomes_query_parameter() {
        let template = PathTemplate::bind(
            "{a}",
            &params(&[("a", PrimitiveType::I64), ("b", PrimitiveType::String)]),
        )
        .unwrap();

        assert_eq!(template.path_params.len(), 1);
        assert_eq!(template.path_params[0].name, "a");
        assert_eq!(template.query_params.len(), 1);
        assert_eq!(template.query_params[0].name, "b");
    }

    #[test]
    fn test_unbound_placeholder_fails() {
        let err =
            PathTemplate::bind("/users/{id}", &params(&[("name", PrimitiveType::String)]))
                .unwrap_err();
        match err {
            Error::UnboundPathParameter { name, .. } => assert_eq!(name, "id"),
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unit_parameters_with_placeholder_fail() {
        assert!(matches!(
            PathTemplate::bind("/users/{id}", &TypeDescriptor::Unit),
            Err(Error::UnboundPathParameter { .. })
        ));
        let template = PathTemplate::bind("/health", &TypeDescriptor::Unit).unwrap();
        assert_eq!(template.path(), "/health");
    }

    #[test]
    fn test_path_order_follows_segments() {
        let template = PathTemplate::bind(
            "/orgs/{org}/repos/{repo}",
            &params(&[("repo", PrimitiveType::String), ("org", PrimitiveType::String)]),
        )
        .unwrap();
        let names: Vec<_> = template.path_params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["org", "repo"]);
    }

    #[test]
    fn test_axum_style_segments() {
        let segments = PathTemplate::parse("/users/:id").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("users".to_string()),
                Segment::Param("id".to_string())
            ]
        );
    }

    #[test]
    fn test_malformed_paths() {
        for path in ["/users/{id", "/files/{}", "/a/{x}/b/{x}", "/file.{ext}"] {
            assert!(
                matches!(PathTemplate::parse(path), Err(Error::MalformedPath { .. })),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_route_key_erases_parameter_names() {
        let a = PathTemplate::parse("/users/{id}").unwrap();
        let b = PathTemplate::parse("users/{uid}/").unwrap();
        assert_eq!(route_key(&a), route_key(&b));
        assert_eq!(route_key(&a), "/users/{}");
        assert_ne!(route_key(&a), route_key(&PathTemplate::parse("/users").unwrap()));
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/api/", "users"), "/api/users");
        assert_eq!(join_paths("again", "/long/{a}"), "/again/long/{a}");
        assert_eq!(join_paths("list", ""), "/list");
    }
}
