use std::path::PathBuf;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Why a type could not be turned into a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// The type is not declared in the catalog
    UnknownType,
    /// A trait object or trait: its variants cannot be enumerated
    OpenHierarchy,
    /// A data-carrying enum without an explicit `#[serde(tag = "...")]`
    MissingDiscriminator,
    /// A map whose key type does not serialize to a string
    UnsupportedKeyType(String),
    /// An enum variant shape that has no tagged wire encoding (tuple variants)
    UnsupportedVariant(String),
    /// A generic type instantiated with the wrong number of arguments
    GenericArity { expected: usize, found: usize },
    /// A forward reference that never completed
    UnresolvableRecursion,
    /// `#[serde(flatten)]` on a field that is not an object
    InvalidFlatten(String),
}

impl std::fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolutionErrorKind::UnknownType => write!(f, "type is not declared"),
            ResolutionErrorKind::OpenHierarchy => {
                write!(f, "open hierarchy, variants cannot be enumerated")
            }
            ResolutionErrorKind::MissingDiscriminator => write!(
                f,
                "enum carries data but declares no discriminator (#[serde(tag = \"...\")])"
            ),
            ResolutionErrorKind::UnsupportedKeyType(key) => {
                write!(f, "map key type `{}` is not a string", key)
            }
            ResolutionErrorKind::UnsupportedVariant(variant) => {
                write!(f, "variant `{}` has no tagged encoding", variant)
            }
            ResolutionErrorKind::GenericArity { expected, found } => write!(
                f,
                "expected {} generic argument(s), found {}",
                expected, found
            ),
            ResolutionErrorKind::UnresolvableRecursion => {
                write!(f, "recursive reference never resolved to a schema")
            }
            ResolutionErrorKind::InvalidFlatten(field) => {
                write!(f, "flattened field `{}` is not an object", field)
            }
        }
    }
}

/// Error types for the application
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    ParseError { file: PathBuf, message: String },
    InvalidArgument(String),
    SerializationError(String),
    Resolution {
        type_name: String,
        kind: ResolutionErrorKind,
    },
    NamingCollision { candidate: String, attempts: usize },
    UnboundPathParameter { path: String, name: String },
    MalformedPath { path: String, message: String },
    DuplicateRoute { method: String, path: String },
    FrozenOperation { method: String, path: String },
    ModuleConflict {
        route: String,
        field: String,
        module: String,
    },
    DanglingSchemaReference { reference: String, location: String },
    UndeclaredSecurityScheme { scheme: String, route: String },
}

impl Error {
    pub fn resolution(type_name: impl Into<String>, kind: ResolutionErrorKind) -> Self {
        Error::Resolution {
            type_name: type_name.into(),
            kind,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::ParseError { file, message } => {
                write!(f, "parse error in {}: {}", file.display(), message)
            }
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            Error::Resolution { type_name, kind } => {
                write!(f, "cannot resolve type `{}`: {}", type_name, kind)
            }
            Error::NamingCollision {
                candidate,
                attempts,
            } => write!(
                f,
                "schema name `{}` still collides after {} attempts",
                candidate, attempts
            ),
            Error::UnboundPathParameter { path, name } => write!(
                f,
                "path `{}` declares `{{{}}}` but the parameter type has no field `{}`",
                path, name, name
            ),
            Error::MalformedPath { path, message } => {
                write!(f, "malformed path `{}`: {}", path, message)
            }
            Error::DuplicateRoute { method, path } => {
                write!(f, "route {} {} is declared more than once", method, path)
            }
            Error::FrozenOperation { method, path } => write!(
                f,
                "operation {} {} is finalized and can no longer be configured",
                method, path
            ),
            Error::ModuleConflict {
                route,
                field,
                module,
            } => write!(
                f,
                "module `{}` tried to overwrite `{}` on {}, which another module already set",
                module, field, route
            ),
            Error::DanglingSchemaReference {
                reference,
                location,
            } => write!(
                f,
                "schema reference `{}` in {} does not resolve",
                reference, location
            ),
            Error::UndeclaredSecurityScheme { scheme, route } => write!(
                f,
                "security scheme `{}` used by {} is not declared",
                scheme, route
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML: {}", err))
    }
}

impl From<syn::Error> for Error {
    fn from(err: syn::Error) -> Self {
        Error::ParseError {
            file: PathBuf::from("<unknown>"),
            message: err.to_string(),
        }
    }
}
