use crate::catalog::{FieldDef, RenameRule, TypeCatalog, TypeDef, TypeDefKind, VariantShape};
use crate::descriptor::{
    EnumDescriptor, FieldDescriptor, ObjectDescriptor, PrimitiveType, TypeDescriptor, TypeName,
    TypeRef, UnionDescriptor, VariantDescriptor,
};
use crate::error::{Error, ResolutionErrorKind, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Type resolver - turns type references into descriptor trees
pub struct TypeResolver {
    /// The declared types routes may refer to
    catalog: TypeCatalog,
    /// Cache of resolved types, keyed by the full instantiation
    type_cache: HashMap<TypeRef, Arc<TypeDescriptor>>,
    /// Track types currently being resolved to detect circular references
    resolving_stack: Vec<String>,
}

/// Generic parameter name -> concrete argument
type Bindings = HashMap<String, TypeRef>;

impl TypeResolver {
    /// Create a new TypeResolver over a catalog
    pub fn new(catalog: TypeCatalog) -> Self {
        debug!("Initializing TypeResolver with {} types", catalog.len());
        Self {
            catalog,
            type_cache: HashMap::new(),
            resolving_stack: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Resolve a type reference into its descriptor.
    ///
    /// Results are memoized per instantiation, so `Page<User>` and
    /// `Page<Post>` are resolved (and cached) separately. A type that is
    /// reached again while it is still being resolved comes back as a
    /// [`TypeDescriptor::Reference`] placeholder.
    pub fn resolve(&mut self, ty: &TypeRef) -> Result<Arc<TypeDescriptor>> {
        if let Some(cached) = self.type_cache.get(ty) {
            debug!("Type {} found in cache", ty);
            return Ok(cached.clone());
        }

        let resolved = Arc::new(self.resolve_uncached(ty)?);

        // Descriptors that point at a type still on the stack are partial views
        if self.refers_to_pending(&resolved) {
            debug!("Not caching {}: refers to a type still being resolved", ty);
        } else {
            self.type_cache.insert(ty.clone(), resolved.clone());
        }
        Ok(resolved)
    }

    fn resolve_uncached(&mut self, ty: &TypeRef) -> Result<TypeDescriptor> {
        debug!("Resolving type: {}", ty);
        match ty {
            TypeRef::Unit => Ok(TypeDescriptor::Unit),
            TypeRef::Option(inner) => Ok(self.resolve(inner)?.as_ref().clone()),
            TypeRef::Array(inner) => Ok(TypeDescriptor::Array(Box::new(
                self.resolve(inner)?.as_ref().clone(),
            ))),
            TypeRef::Map(key, value) => {
                let key_descriptor = self.resolve(key)?;
                let string_keyed = match key_descriptor.as_ref() {
                    TypeDescriptor::Primitive(primitive) => primitive.is_string_like(),
                    TypeDescriptor::Enum(_) => true,
                    _ => false,
                };
                if !string_keyed {
                    return Err(Error::resolution(
                        ty.to_string(),
                        ResolutionErrorKind::UnsupportedKeyType(key.to_string()),
                    ));
                }
                Ok(TypeDescriptor::Map {
                    key: Box::new(key_descriptor.as_ref().clone()),
                    value: Box::new(self.resolve(value)?.as_ref().clone()),
                })
            }
            TypeRef::Dynamic(name) => Err(Error::resolution(
                format!("dyn {}", name),
                ResolutionErrorKind::OpenHierarchy,
            )),
            TypeRef::Named { name, args } => {
                if args.is_empty() {
                    if let Some(primitive) = Self::parse_primitive_type(name) {
                        return Ok(TypeDescriptor::Primitive(primitive));
                    }
                }
                self.resolve_declared(name, args)
            }
        }
    }

    fn resolve_declared(&mut self, name: &str, args: &[TypeRef]) -> Result<TypeDescriptor> {
        let type_name = TypeName::instantiated(name, args);

        // Check for circular reference
        if self.resolving_stack.contains(&type_name.display) {
            debug!("Circular reference to {}, emitting forward reference", type_name);
            return Ok(TypeDescriptor::Reference(type_name));
        }

        let def = match self.catalog.get(name) {
            Some(def) => def.clone(),
            None => {
                warn!("Could not resolve type: {}", type_name);
                return Err(Error::resolution(
                    type_name.display,
                    ResolutionErrorKind::UnknownType,
                ));
            }
        };

        if def.generics.len() != args.len() {
            return Err(Error::resolution(
                type_name.display,
                ResolutionErrorKind::GenericArity {
                    expected: def.generics.len(),
                    found: args.len(),
                },
            ));
        }
        let bindings: Bindings = def
            .generics
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();

        self.resolving_stack.push(type_name.display.clone());
        let result = self.resolve_definition(&def, type_name, &bindings);
        self.resolving_stack.pop();
        result
    }

    fn resolve_definition(
        &mut self,
        def: &TypeDef,
        type_name: TypeName,
        bindings: &Bindings,
    ) -> Result<TypeDescriptor> {
        match &def.kind {
            TypeDefKind::Struct(struct_def) => {
                let mut object = ObjectDescriptor::new(type_name);
                object.description = def.description.clone();
                object.fields = self.resolve_fields(
                    &object.name,
                    &struct_def.fields,
                    struct_def.rename_all,
                    bindings,
                )?;
                Ok(TypeDescriptor::Object(object))
            }
            TypeDefKind::Alias(target) => {
                let target = substitute(target, bindings);
                Ok(self.resolve(&target)?.as_ref().clone())
            }
            TypeDefKind::Enum(enum_def) => {
                let Some(discriminator) = &enum_def.tag else {
                    let all_unit = enum_def
                        .variants
                        .iter()
                        .all(|v| matches!(v.shape, VariantShape::Unit));
                    if !all_unit {
                        return Err(Error::resolution(
                            type_name.display,
                            ResolutionErrorKind::MissingDiscriminator,
                        ));
                    }
                    return Ok(TypeDescriptor::Enum(EnumDescriptor {
                        name: type_name,
                        description: def.description.clone(),
                        values: enum_def
                            .variants
                            .iter()
                            .map(|v| v.tag(enum_def.rename_all))
                            .collect(),
                    }));
                };

                let mut variants = Vec::with_capacity(enum_def.variants.len());
                for variant in &enum_def.variants {
                    let variant_name = TypeName {
                        base: format!("{}{}", type_name.base, variant.name),
                        args: type_name.args.clone(),
                        display: format!("{}::{}", type_name.display, variant.name),
                    };
                    let object = match &variant.shape {
                        VariantShape::Unit => {
                            let mut object = ObjectDescriptor::new(variant_name);
                            object.description = variant.description.clone();
                            object
                        }
                        VariantShape::Struct(fields) => {
                            let mut object = ObjectDescriptor::new(variant_name);
                            object.description = variant.description.clone();
                            object.fields =
                                self.resolve_fields(&object.name, fields, None, bindings)?;
                            object
                        }
                        VariantShape::Newtype(inner) => {
                            let inner = substitute(inner, bindings);
                            match self.resolve(&inner)?.as_ref() {
                                TypeDescriptor::Object(object) => object.clone(),
                                _ => {
                                    return Err(Error::resolution(
                                        type_name.display.clone(),
                                        ResolutionErrorKind::UnsupportedVariant(
                                            variant.name.clone(),
                                        ),
                                    ))
                                }
                            }
                        }
                        VariantShape::Tuple(_) => {
                            return Err(Error::resolution(
                                type_name.display.clone(),
                                ResolutionErrorKind::UnsupportedVariant(variant.name.clone()),
                            ))
                        }
                    };
                    variants.push(VariantDescriptor {
                        tag: variant.tag(enum_def.rename_all),
                        object,
                    });
                }

                debug!(
                    "Resolved closed hierarchy {} with {} variants on `{}`",
                    type_name,
                    variants.len(),
                    discriminator
                );
                Ok(TypeDescriptor::Union(UnionDescriptor {
                    name: type_name,
                    description: def.description.clone(),
                    discriminator: discriminator.clone(),
                    variants,
                }))
            }
            TypeDefKind::Open => Err(Error::resolution(
                type_name.display,
                ResolutionErrorKind::OpenHierarchy,
            )),
        }
    }

    fn resolve_fields(
        &mut self,
        owner: &TypeName,
        fields: &[FieldDef],
        rename_all: Option<RenameRule>,
        bindings: &Bindings,
    ) -> Result<Vec<FieldDescriptor>> {
        let mut resolved = Vec::with_capacity(fields.len());

        for field in fields {
            if field.serde_attrs.skip {
                continue;
            }
            let ty = substitute(&field.ty, bindings);

            if field.serde_attrs.flatten {
                match self.resolve(&ty)?.as_ref() {
                    TypeDescriptor::Object(object) => {
                        resolved.extend(object.fields.iter().cloned());
                        continue;
                    }
                    _ => {
                        return Err(Error::resolution(
                            owner.display.clone(),
                            ResolutionErrorKind::InvalidFlatten(field.name.clone()),
                        ))
                    }
                }
            }

            let (inner, nullable) = match &ty {
                TypeRef::Option(inner) => (inner.as_ref(), true),
                other => (other, false),
            };
            let descriptor = self.resolve(inner)?.as_ref().clone();

            resolved.push(FieldDescriptor {
                name: field.wire_name(rename_all),
                descriptor,
                required: !nullable && !field.serde_attrs.default,
                nullable,
                description: field.description.clone(),
            });
        }

        debug!("Resolved {} fields of {}", resolved.len(), owner);
        Ok(resolved)
    }

    fn refers_to_pending(&self, descriptor: &TypeDescriptor) -> bool {
        match descriptor {
            TypeDescriptor::Reference(name) => self.resolving_stack.contains(&name.display),
            TypeDescriptor::Array(inner) => self.refers_to_pending(inner),
            TypeDescriptor::Map { value, .. } => self.refers_to_pending(value),
            TypeDescriptor::Object(object) => object
                .fields
                .iter()
                .any(|f| self.refers_to_pending(&f.descriptor)),
            TypeDescriptor::Union(union) => union.variants.iter().any(|v| {
                v.object
                    .fields
                    .iter()
                    .any(|f| self.refers_to_pending(&f.descriptor))
            }),
            TypeDescriptor::Primitive(_) | TypeDescriptor::Enum(_) | TypeDescriptor::Unit => false,
        }
    }

    /// Parse a primitive type name
    fn parse_primitive_type(type_name: &str) -> Option<PrimitiveType> {
        match type_name {
            "String" | "str" => Some(PrimitiveType::String),
            "i8" => Some(PrimitiveType::I8),
            "i16" => Some(PrimitiveType::I16),
            "i32" => Some(PrimitiveType::I32),
            "i64" | "isize" => Some(PrimitiveType::I64),
            "i128" => Some(PrimitiveType::I128),
            "u8" => Some(PrimitiveType::U8),
            "u16" => Some(PrimitiveType::U16),
            "u32" => Some(PrimitiveType::U32),
            "u64" | "usize" => Some(PrimitiveType::U64),
            "u128" => Some(PrimitiveType::U128),
            "f32" => Some(PrimitiveType::F32),
            "f64" => Some(PrimitiveType::F64),
            "bool" => Some(PrimitiveType::Bool),
            "char" => Some(PrimitiveType::Char),
            "Uuid" => Some(PrimitiveType::Uuid),
            "DateTime" | "NaiveDateTime" | "OffsetDateTime" | "SystemTime" => {
                Some(PrimitiveType::DateTime)
            }
            "NaiveDate" | "Date" => Some(PrimitiveType::Date),
            _ => None,
        }
    }
}

/// Replaces generic parameters with their bound arguments.
fn substitute(ty: &TypeRef, bindings: &Bindings) -> TypeRef {
    if bindings.is_empty() {
        return ty.clone();
    }
    match ty {
        TypeRef::Named { name, args } if args.is_empty() => bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        TypeRef::Named { name, args } => TypeRef::Named {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        TypeRef::Option(inner) => TypeRef::option(substitute(inner, bindings)),
        TypeRef::Array(inner) => TypeRef::array(substitute(inner, bindings)),
        TypeRef::Map(key, value) => {
            TypeRef::map(substitute(key, bindings), substitute(value, bindings))
        }
        TypeRef::Unit | TypeRef::Dynamic(_) => ty.clone(),
    }
}
