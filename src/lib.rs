//! openapi-synth - OpenAPI 3.0 documents synthesized from typed route declarations.
//!
//! Routes are declared with their path, method, parameter type, request type
//! and response types. The types live in a closed [`catalog::TypeCatalog`],
//! filled by hand or collected from Rust sources with `syn`. Every type is
//! resolved into a structural descriptor, registered once as a named
//! component schema, and referenced from the operations that use it.
//!
//! # Architecture
//!
//! 1. [`descriptor`] - Type references and the structural descriptors they resolve to
//! 2. [`catalog`] - The closed set of declared types, optionally read from sources
//! 3. [`type_resolver`] - Resolves references against the catalog, with generics and recursion
//! 4. [`schema_registry`] - Deduplicates and names component schemas
//! 5. [`path_template`] - Parses paths and binds their placeholders to parameter fields
//! 6. [`operation`] - The per-route operation and its Declared / Accumulating / Finalized states
//! 7. [`modules`] - Operation modules that contribute parameters, bodies, tags, security and errors
//! 8. [`routes`] - Route registration, scopes and the [`routes::ApiBuilder`]
//! 9. [`assembler`] - Document types and the validating assembly pass
//! 10. [`endpoint`] - Serving the shared document with a per-request server entry
//! 11. [`manifest`], [`scanner`], [`parser`], [`serializer`], [`cli`] - The command-line pipeline
//!
//! # Example Usage
//!
//! ```
//! use openapi_synth::catalog::{FieldDef, TypeCatalog, TypeDef};
//! use openapi_synth::descriptor::TypeRef;
//! use openapi_synth::modules::InfoModule;
//! use openapi_synth::routes::{ApiBuilder, RouteDecl};
//! use openapi_synth::serializer::serialize_yaml;
//! use std::sync::Arc;
//!
//! let catalog = TypeCatalog::new()
//!     .with(TypeDef::structure("StringParam", vec![FieldDef::new("a", TypeRef::named("String"))]))
//!     .with(TypeDef::structure("StringResponse", vec![FieldDef::new("str", TypeRef::named("String"))]));
//!
//! let mut builder = ApiBuilder::new(catalog);
//! builder
//!     .route(
//!         RouteDecl::get("string/{a}")
//!             .params(TypeRef::named("StringParam"))
//!             .response(200, TypeRef::named("StringResponse")),
//!         vec![Arc::new(InfoModule::summary("Echo"))],
//!     )
//!     .unwrap();
//!
//! let document = builder.build().unwrap();
//! println!("{}", serialize_yaml(&document).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod assembler;
pub mod catalog;
pub mod cli;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod manifest;
pub mod modules;
pub mod operation;
pub mod parser;
pub mod path_template;
pub mod routes;
pub mod scanner;
pub mod schema_registry;
pub mod serializer;
pub mod type_resolver;
