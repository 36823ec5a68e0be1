use openapi_synth::{
    catalog::{FieldDef, TypeCatalog, TypeDef, VariantDef, VariantShape},
    descriptor::TypeRef,
    endpoint::{DocumentEndpoint, RequestOrigin},
    error::Error,
    manifest::ApiManifest,
    modules::{InfoModule, TagModule},
    operation::{HttpMethod, OperationState, ParameterLocation},
    parser::AstParser,
    routes::{ApiBuilder, RouteDecl},
    scanner::FileScanner,
    serializer::{serialize_json, serialize_yaml},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn petstore_builder() -> ApiBuilder {
    let temp_dir = create_test_project(vec![
        ("src/models.rs", include_str!("fixtures/petstore_models.rs")),
        ("api.yaml", include_str!("fixtures/petstore_api.yaml")),
    ]);

    let scan_result = FileScanner::new(temp_dir.path().to_path_buf())
        .scan()
        .expect("Failed to scan directory");
    let batch = AstParser::parse_files(&scan_result.rust_files);
    assert!(batch.failed.is_empty(), "Fixture should parse: {:?}", batch.failed);

    let catalog = TypeCatalog::from_parsed_files(&batch.parsed);
    let manifest_path = scan_result.manifest.expect("Should find api.yaml");
    ApiManifest::from_path(&manifest_path)
        .expect("Failed to read manifest")
        .into_builder(catalog)
        .expect("Failed to register routes")
}

fn string_catalog() -> TypeCatalog {
    TypeCatalog::new()
        .with(TypeDef::structure(
            "StringParam",
            vec![FieldDef::new("a", TypeRef::named("String"))],
        ))
        .with(TypeDef::structure(
            "StringResponse",
            vec![FieldDef::new("str", TypeRef::named("String"))],
        ))
}

#[test]
fn test_string_param_end_to_end() {
    let mut builder = ApiBuilder::new(string_catalog());
    builder
        .route(
            RouteDecl::get("string/{a}")
                .params(TypeRef::named("StringParam"))
                .response(200, TypeRef::named("StringResponse"))
                .example(json!({"str": "Hi"})),
            vec![Arc::new(InfoModule::summary("String param"))],
        )
        .unwrap();
    let document = builder.build().unwrap();

    let op = document.operation(HttpMethod::Get, "/string/{a}").unwrap();
    assert_eq!(op.state(), OperationState::Finalized);

    let params = op.parameters();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].name, "a");
    assert_eq!(params[0].location, ParameterLocation::Path);
    assert!(params[0].required);
    assert_eq!(params[0].schema.schema_type.as_deref(), Some("string"));

    let body = &op.responses()["200"].content.as_ref().unwrap()["application/json"];
    assert_eq!(body.schema.referenced_name(), Some("StringResponse"));
    assert_eq!(body.example, Some(json!({"str": "Hi"})));

    let schema = document.schema("StringResponse").unwrap();
    assert!(schema.properties.as_ref().unwrap().contains_key("str"));
    assert_eq!(schema.required, Some(vec!["str".to_string()]));
}

#[test]
fn test_petstore_from_sources_and_manifest() {
    let document = petstore_builder().build().expect("Failed to assemble");

    let keys: Vec<_> = document.paths.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["/health", "/pets", "/pets/{id}"]);

    let list = document.operation(HttpMethod::Get, "/pets").unwrap();
    assert_eq!(list.summary(), Some("List pets"));
    let query: Vec<_> = list
        .parameters()
        .iter()
        .map(|p| (p.name.as_str(), p.location, p.required))
        .collect();
    assert_eq!(
        query,
        vec![
            ("limit", ParameterLocation::Query, false),
            ("cursor", ParameterLocation::Query, false),
        ]
    );
    assert!(list.tags().contains("pets"));
    assert!(list.responses().contains_key("500"));

    let get = document.operation(HttpMethod::Get, "/pets/{id}").unwrap();
    assert_eq!(get.operation_id(), Some("getPet"));
    assert_eq!(get.parameters()[0].schema.format.as_deref(), Some("uuid"));
    assert_eq!(get.responses()["404"].description, "No such pet");

    let create = document.operation(HttpMethod::Post, "/pets").unwrap();
    let scopes: Vec<_> = create.security().unwrap()["oauth"].iter().cloned().collect();
    assert_eq!(scopes, vec!["pets:read".to_string(), "pets:write".to_string()]);
    assert_eq!(create.examples()["request"]["name"], "Rex");

    let health = document.operation(HttpMethod::Get, "/health").unwrap();
    assert!(health.tags().is_empty());
    assert!(health.responses()["204"].content.is_none());

    let pet = document.schema("Pet").unwrap();
    let properties = pet.properties.as_ref().unwrap();
    let names: Vec<_> = properties.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["id", "name", "birthDate", "tags", "kind"]);
    assert_eq!(
        pet.required,
        Some(vec!["id".to_string(), "name".to_string(), "kind".to_string()])
    );
    assert_eq!(properties["birthDate"].nullable, Some(true));
    assert_eq!(pet.description.as_deref(), Some("A pet in the store"));

    assert!(document.schema("Page").is_some());
    assert_eq!(document.tags[0].description.as_deref(), Some("Everything about pets"));
    assert_eq!(
        document.info.contact.as_ref().unwrap().email.as_deref(),
        Some("store@example.com")
    );
}

#[test]
fn test_sealed_hierarchy_becomes_discriminated_union() {
    let document = petstore_builder().build().unwrap();

    let kind = document.schema("PetKind").unwrap();
    let discriminator = kind.discriminator.as_ref().unwrap();
    assert_eq!(discriminator.property_name, "type");
    let tags: Vec<_> = discriminator.mapping.keys().map(String::as_str).collect();
    assert_eq!(tags, vec!["cat", "dog", "fish"]);
    assert_eq!(kind.one_of.as_ref().unwrap().len(), 3);

    for (tag, reference) in &discriminator.mapping {
        let name = reference.strip_prefix("#/components/schemas/").unwrap();
        let variant = document.schema(name).unwrap();
        let tag_property = &variant.properties.as_ref().unwrap()["type"];
        assert_eq!(tag_property.enum_values, Some(vec![tag.clone()]));
        assert!(variant.required.as_ref().unwrap().contains(&"type".to_string()));
    }
}

#[test]
fn test_programmatic_union_with_abc_variants() {
    let catalog = TypeCatalog::new()
        .with(TypeDef::structure(
            "CPayload",
            vec![FieldDef::new("l", TypeRef::named("i64"))],
        ))
        .with(TypeDef::tagged_enum(
            "Base",
            "type",
            vec![
                VariantDef::new(
                    "A",
                    VariantShape::Struct(vec![FieldDef::new("str", TypeRef::named("String"))]),
                )
                .renamed("a"),
                VariantDef::new(
                    "B",
                    VariantShape::Struct(vec![FieldDef::new("i", TypeRef::named("i32"))]),
                )
                .renamed("b"),
                VariantDef::new("C", VariantShape::Newtype(TypeRef::named("CPayload")))
                    .renamed("c"),
            ],
        ));

    let mut builder = ApiBuilder::new(catalog);
    builder
        .route(RouteDecl::get("/base").response(200, TypeRef::named("Base")), vec![])
        .unwrap();
    let document = builder.build().unwrap();

    let base = document.schema("Base").unwrap();
    let mapping = &base.discriminator.as_ref().unwrap().mapping;
    assert_eq!(mapping.len(), 3);
    assert_eq!(mapping["c"], "#/components/schemas/CPayload");
    assert!(document.schema("BaseA").is_some());
    assert!(document.schema("BaseB").is_some());
}

#[test]
fn test_recursive_closed_hierarchy() {
    let models = AstParser::parse_source(
        "tree.rs",
        r#"
        #[serde(tag = "kind")]
        pub enum Node {
            Leaf { v: i32 },
            Branch(Branch),
        }
        pub struct Branch { pub children: Vec<Branch>, pub parent: Option<Box<Node>> }
    "#,
    )
    .unwrap();

    let mut builder = ApiBuilder::new(TypeCatalog::from_parsed_files(&[models]));
    builder
        .route(RouteDecl::get("/n").response(200, TypeRef::named("Node")), vec![])
        .unwrap();
    let document = builder.build().expect("Recursive hierarchy should assemble");

    let node = document.schema("Node").unwrap();
    let mapping = &node.discriminator.as_ref().unwrap().mapping;
    let tags: Vec<_> = mapping.keys().map(String::as_str).collect();
    assert_eq!(tags, vec!["Branch", "Leaf"]);

    let branch = document.schema("Branch").unwrap();
    let parent = &branch.properties.as_ref().unwrap()["parent"];
    assert_eq!(parent.all_of.as_ref().unwrap()[0].referenced_name(), Some("Node"));
}

#[test]
fn test_generic_instantiations_over_equal_shapes_stay_distinct() {
    let catalog = TypeCatalog::new()
        .with(
            TypeDef::structure("Wrapper", vec![FieldDef::new("value", TypeRef::named("T"))])
                .with_generics(&["T"]),
        )
        .with(TypeDef::structure("A", vec![FieldDef::new("x", TypeRef::named("String"))]))
        .with(TypeDef::structure("B", vec![FieldDef::new("x", TypeRef::named("String"))]));

    let mut builder = ApiBuilder::new(catalog);
    builder
        .route(
            RouteDecl::get("/a").response(200, TypeRef::parse("Wrapper<A>").unwrap()),
            vec![],
        )
        .unwrap();
    builder
        .route(
            RouteDecl::get("/b").response(200, TypeRef::parse("Wrapper<B>").unwrap()),
            vec![],
        )
        .unwrap();
    let document = builder.build().unwrap();

    let body = |path: &str| {
        let op = document.operation(HttpMethod::Get, path).unwrap();
        op.responses()["200"].content.as_ref().unwrap()["application/json"]
            .schema
            .referenced_name()
            .unwrap()
            .to_string()
    };
    assert_eq!(body("/a"), "Wrapper");
    assert_eq!(body("/b"), "Wrapper_B");
    assert!(document.schema("Wrapper_B").is_some());
}

#[test]
fn test_round_trip_through_json_and_yaml() {
    let document = petstore_builder().build().unwrap();

    let json: openapi_synth::assembler::OpenApiDocument =
        serde_json::from_str(&serialize_json(&document).unwrap()).unwrap();
    let yaml: openapi_synth::assembler::OpenApiDocument =
        serde_yaml::from_str(&serialize_yaml(&document).unwrap()).unwrap();

    for parsed in [json, yaml] {
        for (path, item) in &document.paths {
            let reparsed = &parsed.paths[path];
            for (method, op) in item.operations() {
                let other = reparsed
                    .get_operation(method)
                    .unwrap_or_else(|| panic!("{} {} lost", method, path));
                assert_eq!(other.responses(), op.responses());
            }
        }
        let names = |d: &openapi_synth::assembler::OpenApiDocument| -> Vec<String> {
            d.components.as_ref().unwrap().schemas.as_ref().unwrap().keys().cloned().collect()
        };
        assert_eq!(names(&parsed), names(&document));
    }
}

#[test]
fn test_duplicate_route_is_rejected() {
    let mut builder = ApiBuilder::new(string_catalog());
    builder
        .route(RouteDecl::get("/foo").response(200, TypeRef::Unit), vec![])
        .unwrap();
    let err = builder
        .route(RouteDecl::get("/foo").response(200, TypeRef::Unit), vec![])
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateRoute { ref method, .. } if method == "GET"));
}

#[test]
fn test_configure_after_registration_is_frozen() {
    let mut builder = ApiBuilder::new(string_catalog());
    builder
        .route(RouteDecl::get("/foo").response(200, TypeRef::Unit), vec![])
        .unwrap();

    let err = builder
        .configure(HttpMethod::Get, "/foo", Arc::new(TagModule::new(["late"])))
        .unwrap_err();
    assert!(matches!(err, Error::FrozenOperation { .. }));

    let document = builder.build().unwrap();
    let op = document.operation(HttpMethod::Get, "/foo").unwrap();
    assert!(op.tags().is_empty());
    assert!(document.tags.is_empty());
}

#[test]
fn test_served_document_overlay_and_redirect() {
    let document = Arc::new(petstore_builder().build().unwrap());
    let endpoint = DocumentEndpoint::new(document.clone());

    let served: serde_json::Value = serde_json::from_str(
        &endpoint
            .serve_json(&RequestOrigin::new("https", "api.test.com", 443))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(served["servers"][0]["url"], "https://api.test.com");
    assert_eq!(served["servers"][1]["url"], "https://pets.example.com");

    let local: serde_json::Value = serde_json::from_str(
        &endpoint
            .serve_json(&RequestOrigin::new("http", "localhost", 8080))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(local["servers"][0]["url"], "http://localhost:8080");

    assert_eq!(document.servers.len(), 1);
    assert_eq!(
        endpoint.redirect_location(),
        "/swagger-ui/index.html?url=/openapi.json"
    );
}

#[test]
fn test_failed_build_publishes_nothing() {
    let temp_dir = create_test_project(vec![(
        "api.yaml",
        "routes:\n  - method: get\n    path: /x\n    security:\n      - scheme: missing\n    responses:\n      200: {}\n",
    )]);
    let manifest = ApiManifest::from_path(&temp_dir.path().join("api.yaml")).unwrap();
    let builder = manifest.into_builder(TypeCatalog::new()).unwrap();

    match builder.build() {
        Err(Error::UndeclaredSecurityScheme { scheme, route }) => {
            assert_eq!(scheme, "missing");
            assert_eq!(route, "GET /x");
        }
        other => panic!("Expected an undeclared scheme error, got {:?}", other.map(|_| ())),
    }
}
