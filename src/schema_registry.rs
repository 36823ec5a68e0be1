use crate::descriptor::{
    EnumDescriptor, ObjectDescriptor, PrimitiveType, TypeDescriptor, TypeName, UnionDescriptor,
};
use crate::error::{Error, ResolutionErrorKind, Result};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of a component schema
pub type SchemaName = String;

/// Prefix of every component schema reference
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Marker for a reference to a type whose registration has not completed yet
const PENDING_REF_PREFIX: &str = "#/pending/";

/// OpenAPI Schema definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g., "int32", "int64", "float", "double")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Properties for object types, in field order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    /// Required field names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Value schema for map types
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<Schema>>,
    /// Enum values for enum types
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Reference to another schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Lower bound, emitted for unsigned and sub-32-bit integers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    /// Upper bound, emitted for sub-32-bit integers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
    #[serde(rename = "oneOf", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(rename = "allOf", skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Discriminator>,
}

/// OpenAPI Discriminator object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminator {
    #[serde(rename = "propertyName")]
    pub property_name: String,
    /// Tag value -> schema reference
    pub mapping: BTreeMap<String, String>,
}

impl Schema {
    pub fn typed(schema_type: &str) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            ..Self::default()
        }
    }

    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", SCHEMA_REF_PREFIX, name)),
            ..Self::default()
        }
    }

    fn pending(type_display: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", PENDING_REF_PREFIX, type_display)),
            ..Self::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array")
        }
    }

    /// True for a bare `$ref` with no sibling keywords.
    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
            && Schema {
                reference: None,
                ..self.clone()
            } == Schema::default()
    }

    /// The component name this schema points at, for a component reference.
    pub fn referenced_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(SCHEMA_REF_PREFIX))
    }

    /// Visits every `$ref` in this schema and its subschemas.
    pub fn visit_references<'a>(&'a self, visit: &mut dyn FnMut(&'a str)) {
        if let Some(reference) = &self.reference {
            visit(reference);
        }
        let children = self
            .properties
            .iter()
            .flat_map(|p| p.values())
            .chain(self.items.as_deref())
            .chain(self.additional_properties.as_deref())
            .chain(self.one_of.iter().flatten())
            .chain(self.all_of.iter().flatten());
        for child in children {
            child.visit_references(visit);
        }
        if let Some(discriminator) = &self.discriminator {
            for target in discriminator.mapping.values() {
                visit(target);
            }
        }
    }

    fn visit_references_mut(&mut self, visit: &mut dyn FnMut(&mut String)) {
        if let Some(reference) = &mut self.reference {
            visit(reference);
        }
        if let Some(properties) = &mut self.properties {
            for child in properties.values_mut() {
                child.visit_references_mut(visit);
            }
        }
        if let Some(items) = &mut self.items {
            items.visit_references_mut(visit);
        }
        if let Some(values) = &mut self.additional_properties {
            values.visit_references_mut(visit);
        }
        for child in self
            .one_of
            .iter_mut()
            .flatten()
            .chain(self.all_of.iter_mut().flatten())
        {
            child.visit_references_mut(visit);
        }
        if let Some(discriminator) = &mut self.discriminator {
            for target in discriminator.mapping.values_mut() {
                visit(target);
            }
        }
    }

    /// Attaches field-level metadata. A bare `$ref` ignores sibling keywords
    /// in OpenAPI 3.0, so references are wrapped in `allOf` first.
    fn decorate(self, nullable: bool, description: Option<&String>) -> Schema {
        if !nullable && description.is_none() {
            return self;
        }
        let mut schema = if self.is_reference() {
            Schema {
                all_of: Some(vec![self]),
                ..Schema::default()
            }
        } else {
            self
        };
        if nullable {
            schema.nullable = Some(true);
        }
        if let Some(description) = description {
            schema.description = Some(description.clone());
        }
        schema
    }
}

/// Where a named shape ended up.
enum Registered {
    Named(SchemaName),
    /// Still being registered higher up the stack
    Pending(String),
}

impl Registered {
    fn into_schema(self) -> Schema {
        match self {
            Registered::Named(name) => Schema::reference(&name),
            Registered::Pending(display) => Schema::pending(&display),
        }
    }
}

/// Schema registry - names, deduplicates and stores component schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// Component schemas by name
    schemas: BTreeMap<SchemaName, Schema>,
    /// Type instantiation (display form) -> assigned name
    by_type: HashMap<String, SchemaName>,
    /// Declared types sharing each component
    owners: HashMap<SchemaName, Vec<TypeName>>,
    /// Named shapes currently being registered
    pending: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        debug!("Initializing SchemaRegistry");
        Self::default()
    }

    /// Renders a descriptor, registering every named shape it contains.
    ///
    /// Objects, unions and enums come back as a `$ref` to their component;
    /// primitives, arrays and maps are rendered inline.
    pub fn register(&mut self, descriptor: &TypeDescriptor) -> Result<Schema> {
        match descriptor {
            TypeDescriptor::Primitive(primitive) => Ok(Self::primitive_to_schema(primitive)),
            TypeDescriptor::Unit => Ok(Schema::typed("object")),
            TypeDescriptor::Array(items) => Ok(Schema::array(self.register(items)?)),
            TypeDescriptor::Map { value, .. } => Ok(Schema {
                additional_properties: Some(Box::new(self.register(value)?)),
                ..Schema::typed("object")
            }),
            TypeDescriptor::Object(object) => Ok(self.register_object(object, None)?.into_schema()),
            TypeDescriptor::Union(union) => Ok(self.register_union(union)?.into_schema()),
            TypeDescriptor::Enum(enumeration) => {
                Ok(self.register_enum(enumeration)?.into_schema())
            }
            TypeDescriptor::Reference(name) => Ok(self.lookup_reference(name)?.into_schema()),
        }
    }

    /// Registers a named shape and returns its component name.
    ///
    /// Registering a structurally equal descriptor again returns the same
    /// name and adds nothing.
    pub fn register_named(&mut self, descriptor: &TypeDescriptor) -> Result<SchemaName> {
        let registered = match descriptor {
            TypeDescriptor::Object(object) => self.register_object(object, None)?,
            TypeDescriptor::Union(union) => self.register_union(union)?,
            TypeDescriptor::Enum(enumeration) => self.register_enum(enumeration)?,
            TypeDescriptor::Reference(name) => self.lookup_reference(name)?,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "{:?} has no component name",
                    other
                )))
            }
        };
        match registered {
            Registered::Named(name) => Ok(name),
            Registered::Pending(display) => Err(Error::resolution(
                display,
                ResolutionErrorKind::UnresolvableRecursion,
            )),
        }
    }

    /// Name assigned to a type instantiation, if registered.
    pub fn name_of(&self, type_name: &TypeName) -> Option<&SchemaName> {
        self.by_type.get(&type_name.display)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Get all registered schemas
    pub fn schemas(&self) -> &BTreeMap<SchemaName, Schema> {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Forward references that were never back-patched, as `(schema, type)`.
    pub fn unresolved(&self) -> Vec<(SchemaName, String)> {
        let mut unresolved = Vec::new();
        for (name, schema) in &self.schemas {
            schema.visit_references(&mut |reference| {
                if let Some(display) = reference.strip_prefix(PENDING_REF_PREFIX) {
                    unresolved.push((name.clone(), display.to_string()));
                }
            });
        }
        unresolved
    }

    fn lookup_reference(&self, type_name: &TypeName) -> Result<Registered> {
        if let Some(name) = self.by_type.get(&type_name.display) {
            return Ok(Registered::Named(name.clone()));
        }
        if self.pending.contains(&type_name.display) {
            return Ok(Registered::Pending(type_name.display.clone()));
        }
        Err(Error::resolution(
            type_name.display.clone(),
            ResolutionErrorKind::UnresolvableRecursion,
        ))
    }

    /// Returns early when the shape is already known or in progress.
    fn existing(&self, type_name: &TypeName) -> Option<Registered> {
        self.lookup_reference(type_name).ok()
    }

    fn register_object(
        &mut self,
        object: &ObjectDescriptor,
        tag: Option<(&str, &str)>,
    ) -> Result<Registered> {
        let key = match tag {
            Some((_, tag)) => format!("{}#{}", object.name.display, tag),
            None => object.name.display.clone(),
        };
        let key_name = TypeName {
            display: key.clone(),
            ..object.name.clone()
        };
        if let Some(existing) = self.existing(&key_name) {
            return Ok(existing);
        }

        // A newtype variant may refer back to its own inner type, which
        // serializes without the tag
        let plain = &object.name.display;
        let tracks_plain = tag.is_some() && self.existing(&object.name).is_none();

        debug!("Registering object schema for {}", key);
        let depth = self.pending.len();
        self.pending.push(key.clone());
        if tracks_plain {
            self.pending.push(plain.clone());
        }
        let rendered = self.render_object(object, tag);
        self.pending.truncate(depth);

        let name = self.bind_name(&object.name, rendered?)?;
        self.complete(&key, &name);
        if tracks_plain && self.awaits(plain) {
            debug!("Registering untagged {} for its forward references", plain);
            self.register_object(object, None)?;
        }
        Ok(Registered::Named(name))
    }

    /// True while some stored schema still holds a forward marker to `display`.
    fn awaits(&self, display: &str) -> bool {
        self.unresolved().iter().any(|(_, pending)| pending == display)
    }

    fn render_object(
        &mut self,
        object: &ObjectDescriptor,
        tag: Option<(&str, &str)>,
    ) -> Result<Schema> {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();

        if let Some((discriminator, tag)) = tag {
            properties.insert(
                discriminator.to_string(),
                Schema {
                    enum_values: Some(vec![tag.to_string()]),
                    ..Schema::typed("string")
                },
            );
            required.push(discriminator.to_string());
        }

        for field in &object.fields {
            let schema = self
                .register(&field.descriptor)?
                .decorate(field.nullable, field.description.as_ref());
            properties.insert(field.name.clone(), schema);
            if field.required {
                required.push(field.name.clone());
            }
        }

        Ok(Schema {
            description: object.description.clone(),
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required)
            },
            ..Schema::typed("object")
        })
    }

    fn register_union(&mut self, union: &UnionDescriptor) -> Result<Registered> {
        if let Some(existing) = self.existing(&union.name) {
            return Ok(existing);
        }

        debug!(
            "Registering union schema for {} ({} variants)",
            union.name,
            union.variants.len()
        );
        let depth = self.pending.len();
        self.pending.push(union.name.display.clone());
        let rendered = self.render_union(union);
        self.pending.truncate(depth);

        let name = self.bind_name(&union.name, rendered?)?;
        self.complete(&union.name.display, &name);
        Ok(Registered::Named(name))
    }

    fn render_union(&mut self, union: &UnionDescriptor) -> Result<Schema> {
        let mut one_of = Vec::with_capacity(union.variants.len());
        let mut mapping = BTreeMap::new();

        for variant in &union.variants {
            let variant_ref = self
                .register_object(
                    &variant.object,
                    Some((union.discriminator.as_str(), variant.tag.as_str())),
                )?
                .into_schema();
            if let Some(reference) = &variant_ref.reference {
                mapping.insert(variant.tag.clone(), reference.clone());
            }
            one_of.push(variant_ref);
        }

        Ok(Schema {
            description: union.description.clone(),
            one_of: Some(one_of),
            discriminator: Some(Discriminator {
                property_name: union.discriminator.clone(),
                mapping,
            }),
            ..Schema::default()
        })
    }

    fn register_enum(&mut self, enumeration: &EnumDescriptor) -> Result<Registered> {
        if let Some(existing) = self.existing(&enumeration.name) {
            return Ok(existing);
        }
        let schema = Schema {
            description: enumeration.description.clone(),
            enum_values: Some(enumeration.values.clone()),
            ..Schema::typed("string")
        };
        let name = self.bind_name(&enumeration.name, schema)?;
        self.complete(&enumeration.name.display, &name);
        Ok(Registered::Named(name))
    }

    /// Picks the component name for a freshly rendered shape.
    ///
    /// An identical shape already registered keeps its name, unless that
    /// component belongs to another instantiation of the same generic type.
    /// Otherwise the candidates are the bare name, then the name suffixed
    /// with the generic arguments, then numbered variants of the last
    /// candidate.
    fn bind_name(&mut self, type_name: &TypeName, schema: Schema) -> Result<SchemaName> {
        let shared = self
            .schemas
            .iter()
            .find(|(name, s)| **s == schema && !self.owned_by_sibling(name, type_name))
            .map(|(name, _)| name.clone());
        if let Some(name) = shared {
            debug!("{} has the same shape as {}", type_name, name);
            self.claim(&name, type_name);
            return Ok(name);
        }

        let base = sanitize(&type_name.base);
        let mut candidates = vec![base.clone()];
        if !type_name.args.is_empty() {
            candidates.push(sanitize(&format!("{}_{}", base, type_name.args.join("_"))));
        }
        for candidate in &candidates {
            if !self.schemas.contains_key(candidate) {
                debug!("Naming {} as {}", type_name, candidate);
                self.schemas.insert(candidate.clone(), schema);
                self.claim(candidate, type_name);
                return Ok(candidate.clone());
            }
        }

        // Every taken name occupies one slot, so this range always has a free one
        let stem = candidates.last().cloned().unwrap_or(base);
        let attempts = self.schemas.len() + 1;
        for n in 2..=attempts + 1 {
            let candidate = format!("{}_{}", stem, n);
            if !self.schemas.contains_key(&candidate) {
                debug!("Naming {} as {} after collisions", type_name, candidate);
                self.schemas.insert(candidate.clone(), schema);
                self.claim(&candidate, type_name);
                return Ok(candidate);
            }
        }

        Err(Error::NamingCollision {
            candidate: stem,
            attempts,
        })
    }

    /// True when `name` already stands for an instantiation of the same
    /// generic type with different arguments.
    fn owned_by_sibling(&self, name: &str, type_name: &TypeName) -> bool {
        self.owners.get(name).is_some_and(|owners| {
            owners
                .iter()
                .any(|owner| owner.base == type_name.base && owner.args != type_name.args)
        })
    }

    fn claim(&mut self, name: &str, type_name: &TypeName) {
        let owners = self.owners.entry(name.to_string()).or_default();
        if !owners.contains(type_name) {
            owners.push(type_name.clone());
        }
    }

    /// Records the name and back-patches forward references to it.
    fn complete(&mut self, type_display: &str, name: &SchemaName) {
        let pending = format!("{}{}", PENDING_REF_PREFIX, type_display);
        let resolved = format!("{}{}", SCHEMA_REF_PREFIX, name);
        let mut patched = 0usize;
        for schema in self.schemas.values_mut() {
            schema.visit_references_mut(&mut |reference| {
                if *reference == pending {
                    *reference = resolved.clone();
                    patched += 1;
                }
            });
        }
        if patched > 0 {
            debug!("Back-patched {} reference(s) to {}", patched, name);
        }
        self.by_type.insert(type_display.to_string(), name.clone());
    }

    /// Convert a primitive type to an OpenAPI schema
    fn primitive_to_schema(primitive: &PrimitiveType) -> Schema {
        let (schema_type, format) = match primitive {
            PrimitiveType::String | PrimitiveType::Char => ("string", None),
            PrimitiveType::I8
            | PrimitiveType::I16
            | PrimitiveType::I32
            | PrimitiveType::U8
            | PrimitiveType::U16 => ("integer", Some("int32")),
            PrimitiveType::I64 | PrimitiveType::U32 => ("integer", Some("int64")),
            // No OpenAPI format covers these ranges
            PrimitiveType::I128 | PrimitiveType::U64 | PrimitiveType::U128 => ("integer", None),
            PrimitiveType::F32 => ("number", Some("float")),
            PrimitiveType::F64 => ("number", Some("double")),
            PrimitiveType::Bool => ("boolean", None),
            PrimitiveType::Uuid => ("string", Some("uuid")),
            PrimitiveType::DateTime => ("string", Some("date-time")),
            PrimitiveType::Date => ("string", Some("date")),
        };
        let (minimum, maximum): (Option<i64>, Option<i64>) = match primitive {
            PrimitiveType::I8 => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            PrimitiveType::I16 => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            PrimitiveType::U8 => (Some(0), Some(u8::MAX.into())),
            PrimitiveType::U16 => (Some(0), Some(u16::MAX.into())),
            PrimitiveType::U32 | PrimitiveType::U64 | PrimitiveType::U128 => (Some(0), None),
            _ => (None, None),
        };

        Schema {
            format: format.map(|s| s.to_string()),
            minimum,
            maximum,
            ..Schema::typed(schema_type)
        }
    }
}

/// Component names may only contain `[A-Za-z0-9._-]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
