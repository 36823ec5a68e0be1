//! The closed set of declared types that routes may refer to.
//!
//! Types enter the catalog either programmatically through the [`TypeDef`]
//! builders or by collecting `struct`, `enum`, `type` and `trait` items from
//! parsed Rust sources. Serde container and field attributes are read so the
//! generated schemas match the actual wire format.

use crate::descriptor::TypeRef;
use crate::parser::ParsedFile;
use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};
use log::{debug, warn};
use std::collections::HashMap;

/// Catalog of type definitions, indexed by name.
#[derive(Debug, Default, Clone)]
pub struct TypeCatalog {
    types: HashMap<String, TypeDef>,
}

/// One declared type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    /// Names of the generic type parameters, in declaration order
    pub generics: Vec<String>,
    pub description: Option<String>,
    pub kind: TypeDefKind,
}

#[derive(Debug, Clone)]
pub enum TypeDefKind {
    Struct(StructDef),
    Enum(EnumDef),
    /// A newtype struct or a `type` alias, serialized as the inner type
    Alias(TypeRef),
    /// A trait: any number of implementors, not enumerable
    Open,
}

#[derive(Debug, Clone, Default)]
pub struct StructDef {
    pub fields: Vec<FieldDef>,
    pub rename_all: Option<RenameRule>,
}

/// Field definition in a struct or struct-like variant
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub serde_attrs: SerdeAttributes,
}

/// Serde attributes for a field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerdeAttributes {
    /// Renamed field name
    pub rename: Option<String>,
    /// Whether to skip this field during serialization
    pub skip: bool,
    /// Whether to flatten this field
    pub flatten: bool,
    /// Whether the field may be absent (`default` or `skip_serializing_if`)
    pub default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnumDef {
    /// Discriminator field of an internally tagged enum
    pub tag: Option<String>,
    pub rename_all: Option<RenameRule>,
    pub variants: Vec<VariantDef>,
}

#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: String,
    pub rename: Option<String>,
    pub description: Option<String>,
    pub shape: VariantShape,
}

#[derive(Debug, Clone)]
pub enum VariantShape {
    Unit,
    Struct(Vec<FieldDef>),
    Newtype(TypeRef),
    /// Tuple variant with this many fields (more than one)
    Tuple(usize),
}

/// `#[serde(rename_all = "...")]` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    pub fn parse(rule: &str) -> Option<Self> {
        match rule {
            "lowercase" => Some(RenameRule::Lower),
            "UPPERCASE" => Some(RenameRule::Upper),
            "PascalCase" => Some(RenameRule::Pascal),
            "camelCase" => Some(RenameRule::Camel),
            "snake_case" => Some(RenameRule::Snake),
            "SCREAMING_SNAKE_CASE" => Some(RenameRule::ScreamingSnake),
            "kebab-case" => Some(RenameRule::Kebab),
            "SCREAMING-KEBAB-CASE" => Some(RenameRule::ScreamingKebab),
            _ => None,
        }
    }

    pub fn apply(&self, name: &str) -> String {
        match self {
            RenameRule::Lower => name.to_lowercase(),
            RenameRule::Upper => name.to_uppercase(),
            RenameRule::Pascal => name.to_upper_camel_case(),
            RenameRule::Camel => name.to_lower_camel_case(),
            RenameRule::Snake => name.to_snake_case(),
            RenameRule::ScreamingSnake => name.to_shouty_snake_case(),
            RenameRule::Kebab => name.to_kebab_case(),
            RenameRule::ScreamingKebab => name.to_shouty_kebab_case(),
        }
    }
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
            serde_attrs: SerdeAttributes::default(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_serde(mut self, serde_attrs: SerdeAttributes) -> Self {
        self.serde_attrs = serde_attrs;
        self
    }

    /// Name of the field on the wire.
    pub fn wire_name(&self, rule: Option<RenameRule>) -> String {
        match (&self.serde_attrs.rename, rule) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => rule.apply(&self.name),
            (None, None) => self.name.clone(),
        }
    }
}

impl VariantDef {
    pub fn new(name: impl Into<String>, shape: VariantShape) -> Self {
        Self {
            name: name.into(),
            rename: None,
            description: None,
            shape,
        }
    }

    pub fn renamed(mut self, tag: impl Into<String>) -> Self {
        self.rename = Some(tag.into());
        self
    }

    /// Tag of the variant as serde writes it.
    pub fn tag(&self, rule: Option<RenameRule>) -> String {
        match (&self.rename, rule) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => rule.apply(&self.name),
            (None, None) => self.name.clone(),
        }
    }
}

impl TypeDef {
    pub fn structure(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            description: None,
            kind: TypeDefKind::Struct(StructDef {
                fields,
                rename_all: None,
            }),
        }
    }

    /// An internally tagged enum (`#[serde(tag = "...")]`).
    pub fn tagged_enum(
        name: impl Into<String>,
        tag: impl Into<String>,
        variants: Vec<VariantDef>,
    ) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            description: None,
            kind: TypeDefKind::Enum(EnumDef {
                tag: Some(tag.into()),
                rename_all: None,
                variants,
            }),
        }
    }

    /// An enum without a tag attribute.
    pub fn plain_enum(name: impl Into<String>, variants: Vec<VariantDef>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            description: None,
            kind: TypeDefKind::Enum(EnumDef {
                tag: None,
                rename_all: None,
                variants,
            }),
        }
    }

    pub fn alias(name: impl Into<String>, target: TypeRef) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            description: None,
            kind: TypeDefKind::Alias(target),
        }
    }

    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
            description: None,
            kind: TypeDefKind::Open,
        }
    }

    pub fn with_generics(mut self, generics: &[&str]) -> Self {
        self.generics = generics.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition. The first definition of a name wins.
    pub fn insert(&mut self, def: TypeDef) {
        if self.types.contains_key(&def.name) {
            warn!("Type {} is declared more than once, keeping the first", def.name);
            return;
        }
        debug!("Cataloguing type {}", def.name);
        self.types.insert(def.name.clone(), def);
    }

    pub fn with(mut self, def: TypeDef) -> Self {
        self.insert(def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Collects every type declaration from the parsed files, including
    /// declarations inside inline modules.
    pub fn from_parsed_files(parsed_files: &[ParsedFile]) -> Self {
        let mut catalog = Self::new();
        for parsed_file in parsed_files {
            debug!("Collecting types from {}", parsed_file.path.display());
            catalog.collect_items(&parsed_file.syntax_tree.items);
        }
        debug!("Catalog holds {} types", catalog.len());
        catalog
    }

    fn collect_items(&mut self, items: &[syn::Item]) {
        for item in items {
            match item {
                syn::Item::Struct(item_struct) => self.insert(parse_struct(item_struct)),
                syn::Item::Enum(item_enum) => self.insert(parse_enum(item_enum)),
                syn::Item::Type(item_type) => self.insert(TypeDef {
                    name: item_type.ident.to_string(),
                    generics: type_params(&item_type.generics),
                    description: doc_comment(&item_type.attrs),
                    kind: TypeDefKind::Alias(TypeRef::from_syn(&item_type.ty)),
                }),
                syn::Item::Trait(item_trait) => self.insert(TypeDef {
                    name: item_trait.ident.to_string(),
                    generics: type_params(&item_trait.generics),
                    description: doc_comment(&item_trait.attrs),
                    kind: TypeDefKind::Open,
                }),
                syn::Item::Mod(item_mod) => {
                    if let Some((_, nested)) = &item_mod.content {
                        self.collect_items(nested);
                    }
                }
                _ => {}
            }
        }
    }
}

fn type_params(generics: &syn::Generics) -> Vec<String> {
    generics
        .type_params()
        .map(|param| param.ident.to_string())
        .collect()
}

fn parse_struct(item_struct: &syn::ItemStruct) -> TypeDef {
    let name = item_struct.ident.to_string();
    let container = parse_container_attributes(&item_struct.attrs);

    let kind = match &item_struct.fields {
        syn::Fields::Named(named) => TypeDefKind::Struct(StructDef {
            fields: named.named.iter().filter_map(parse_field).collect(),
            rename_all: container.rename_all,
        }),
        syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            TypeDefKind::Alias(TypeRef::from_syn(&unnamed.unnamed[0].ty))
        }
        syn::Fields::Unnamed(_) => TypeDefKind::Alias(TypeRef::named("<tuple>")),
        syn::Fields::Unit => TypeDefKind::Struct(StructDef::default()),
    };

    TypeDef {
        name,
        generics: type_params(&item_struct.generics),
        description: doc_comment(&item_struct.attrs),
        kind,
    }
}

fn parse_enum(item_enum: &syn::ItemEnum) -> TypeDef {
    let container = parse_container_attributes(&item_enum.attrs);
    let variants = item_enum
        .variants
        .iter()
        .map(|variant| {
            let shape = match &variant.fields {
                syn::Fields::Unit => VariantShape::Unit,
                syn::Fields::Named(named) => {
                    VariantShape::Struct(named.named.iter().filter_map(parse_field).collect())
                }
                syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                    VariantShape::Newtype(TypeRef::from_syn(&unnamed.unnamed[0].ty))
                }
                syn::Fields::Unnamed(unnamed) => VariantShape::Tuple(unnamed.unnamed.len()),
            };
            VariantDef {
                name: variant.ident.to_string(),
                rename: parse_serde_attributes(&variant.attrs).rename,
                description: doc_comment(&variant.attrs),
                shape,
            }
        })
        .collect();

    TypeDef {
        name: item_enum.ident.to_string(),
        generics: type_params(&item_enum.generics),
        description: doc_comment(&item_enum.attrs),
        kind: TypeDefKind::Enum(EnumDef {
            tag: container.tag,
            rename_all: container.rename_all,
            variants,
        }),
    }
}

fn parse_field(field: &syn::Field) -> Option<FieldDef> {
    let name = field.ident.as_ref()?.to_string();
    let name = name.strip_prefix("r#").map(str::to_string).unwrap_or(name);
    Some(FieldDef {
        name,
        ty: TypeRef::from_syn(&field.ty),
        description: doc_comment(&field.attrs),
        serde_attrs: parse_serde_attributes(&field.attrs),
    })
}

#[derive(Default)]
struct ContainerAttributes {
    tag: Option<String>,
    rename_all: Option<RenameRule>,
}

fn parse_container_attributes(attrs: &[syn::Attribute]) -> ContainerAttributes {
    let mut container = ContainerAttributes::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let value: syn::LitStr = meta.value()?.parse()?;
                container.tag = Some(value.value());
            } else if meta.path.is_ident("rename_all") {
                if meta.input.peek(syn::Token![=]) {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    container.rename_all = RenameRule::parse(&value.value());
                } else {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("serialize") {
                            let value: syn::LitStr = inner.value()?.parse()?;
                            container.rename_all = RenameRule::parse(&value.value());
                        } else {
                            skip_meta_value(&inner)?;
                        }
                        Ok(())
                    })?;
                }
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!("Ignoring unreadable serde attribute: {}", e);
        }
    }
    container
}

/// Parse Serde attributes from field or variant attributes
fn parse_serde_attributes(attrs: &[syn::Attribute]) -> SerdeAttributes {
    let mut serde_attrs = SerdeAttributes::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(syn::Token![=]) {
                    let value: syn::LitStr = meta.value()?.parse()?;
                    serde_attrs.rename = Some(value.value());
                } else {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("serialize") {
                            let value: syn::LitStr = inner.value()?.parse()?;
                            serde_attrs.rename = Some(value.value());
                        } else {
                            skip_meta_value(&inner)?;
                        }
                        Ok(())
                    })?;
                }
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                serde_attrs.skip = true;
            } else if meta.path.is_ident("flatten") {
                serde_attrs.flatten = true;
            } else if meta.path.is_ident("default") || meta.path.is_ident("skip_serializing_if")
            {
                serde_attrs.default = true;
                skip_meta_value(&meta)?;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!("Ignoring unreadable serde attribute: {}", e);
        }
    }

    serde_attrs
}

/// Consumes `= value` or `(...)` after a serde key we don't interpret.
fn skip_meta_value(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta_value(&inner))?;
    }
    Ok(())
}

/// Joins `///` doc lines into a single description.
fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            syn::Meta::NameValue(name_value) => match &name_value.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(text),
                    ..
                }) => Some(text.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::AstParser;

    fn catalog_from_code(code: &str) -> TypeCatalog {
        let parsed = AstParser::parse_source("test.rs", code).unwrap();
        TypeCatalog::from_parsed_files(&[parsed])
    }

    fn struct_def<'a>(catalog: &'a TypeCatalog, name: &str) -> &'a StructDef {
        match &catalog.get(name).unwrap().kind {
            TypeDefKind::Struct(def) => def,
            other => panic!("Expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_simple_struct() {
        let catalog = catalog_from_code(
            r#"
            pub struct User {
                pub id: u32,
                pub name: String,
                pub email: Option<String>,
            }
        "#,
        );

        let def = struct_def(&catalog, "User");
        assert_eq!(def.fields.len(), 3);
        assert_eq!(def.fields[0].ty, TypeRef::named("u32"));
        assert_eq!(def.fields[2].ty, TypeRef::option(TypeRef::named("String")));
    }

    #[test]
    fn test_collect_generic_struct() {
        let catalog = catalog_from_code(
            r#"
            pub struct Page<T> {
                pub items: Vec<T>,
                pub total: u64,
            }
        "#,
        );

        let def = catalog.get("Page").unwrap();
        assert_eq!(def.generics, vec!["T".to_string()]);
    }

    #[test]
    fn test_parse_serde_field_attributes() {
        let catalog = catalog_from_code(
            r#"
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            pub struct Account {
                #[serde(rename = "userName")]
                pub name: String,
                #[serde(skip)]
                pub password: String,
                #[serde(default, skip_serializing_if = "Vec::is_empty")]
                pub roles: Vec<String>,
                #[serde(flatten)]
                pub audit: Audit,
                pub created_at: String,
            }
        "#,
        );

        let def = struct_def(&catalog, "Account");
        assert_eq!(def.rename_all, Some(RenameRule::Camel));
        assert_eq!(def.fields[0].serde_attrs.rename.as_deref(), Some("userName"));
        assert!(def.fields[1].serde_attrs.skip);
        assert!(def.fields[2].serde_attrs.default);
        assert!(def.fields[3].serde_attrs.flatten);
        assert_eq!(def.fields[4].wire_name(def.rename_all), "createdAt");
        assert_eq!(def.fields[0].wire_name(def.rename_all), "userName");
    }

    #[test]
    fn test_collect_tagged_enum() {
        let catalog = catalog_from_code(
            r#"
            #[derive(Serialize)]
            #[serde(tag = "kind", rename_all = "lowercase")]
            pub enum Shape {
                /// A circle
                Circle { radius: f64 },
                #[serde(rename = "sq")]
                Square(Side),
                Empty,
            }
        "#,
        );

        let def = catalog.get("Shape").unwrap();
        let TypeDefKind::Enum(enum_def) = &def.kind else {
            panic!("Expected enum");
        };
        assert_eq!(enum_def.tag.as_deref(), Some("kind"));
        assert_eq!(enum_def.variants.len(), 3);
        assert_eq!(enum_def.variants[0].tag(enum_def.rename_all), "circle");
        assert_eq!(enum_def.variants[0].description.as_deref(), Some("A circle"));
        assert_eq!(enum_def.variants[1].tag(enum_def.rename_all), "sq");
        assert!(matches!(enum_def.variants[1].shape, VariantShape::Newtype(_)));
        assert!(matches!(enum_def.variants[2].shape, VariantShape::Unit));
    }

    #[test]
    fn test_collect_doc_comments() {
        let catalog = catalog_from_code(
            r#"
            /// A user of the system.
            pub struct User {
                /// Unique identifier
                /// assigned on creation
                pub id: u64,
            }
        "#,
        );

        let def = catalog.get("User").unwrap();
        assert_eq!(def.description.as_deref(), Some("A user of the system."));
        let fields = &struct_def(&catalog, "User").fields;
        assert_eq!(
            fields[0].description.as_deref(),
            Some("Unique identifier assigned on creation")
        );
    }

    #[test]
    fn test_collect_aliases_traits_and_modules() {
        let catalog = catalog_from_code(
            r#"
            pub struct UserId(u64);
            pub type Users = Vec<User>;
            pub trait Plugin {}
            mod nested {
                pub struct Inner { pub x: i32 }
            }
        "#,
        );

        assert!(matches!(
            catalog.get("UserId").unwrap().kind,
            TypeDefKind::Alias(TypeRef::Named { .. })
        ));
        assert!(matches!(
            catalog.get("Users").unwrap().kind,
            TypeDefKind::Alias(TypeRef::Array(_))
        ));
        assert!(matches!(catalog.get("Plugin").unwrap().kind, TypeDefKind::Open));
        assert!(catalog.get("Inner").is_some());
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut catalog = TypeCatalog::new();
        catalog.insert(TypeDef::structure(
            "Error",
            vec![FieldDef::new("id", TypeRef::named("String"))],
        ));
        catalog.insert(TypeDef::structure("Error", vec![]));
        assert_eq!(catalog.len(), 1);
        assert_eq!(struct_def(&catalog, "Error").fields.len(), 1);
    }

    #[test]
    fn test_rename_rules() {
        assert_eq!(RenameRule::Camel.apply("created_at"), "createdAt");
        assert_eq!(RenameRule::Snake.apply("CreatedAt"), "created_at");
        assert_eq!(RenameRule::Kebab.apply("created_at"), "created-at");
        assert_eq!(RenameRule::ScreamingSnake.apply("created_at"), "CREATED_AT");
        assert_eq!(RenameRule::Lower.apply("Circle"), "circle");
        assert_eq!(RenameRule::parse("bogus"), None);
    }
}
