//! Language-neutral type descriptions.
//!
//! A [`TypeRef`] names a type the way a route declaration or a struct field
//! mentions it (`Page<User>`, `Option<String>`, `Vec<Item>`). The
//! [`type_resolver`](crate::type_resolver) turns it into a [`TypeDescriptor`]
//! tree, which the [`schema_registry`](crate::schema_registry) renders into
//! named schemas.
//!
//! Descriptors compare by shape: the declared name of an object, union or enum
//! is carried along for naming but does not take part in equality.

use crate::error::{Error, Result};
use heck::ToUpperCamelCase;
use std::fmt;

/// A reference to a declared type, possibly generic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A named type with its generic arguments (`User`, `i64`, `Page<User>`)
    Named { name: String, args: Vec<TypeRef> },
    /// `Option<T>`
    Option(Box<TypeRef>),
    /// Any ordered or unordered sequence
    Array(Box<TypeRef>),
    /// Any key/value map
    Map(Box<TypeRef>, Box<TypeRef>),
    /// `()`, used for routes without parameters or bodies
    Unit,
    /// A trait object or `impl Trait`: an open set of implementors
    Dynamic(String),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args,
        }
    }

    pub fn option(inner: TypeRef) -> Self {
        TypeRef::Option(Box::new(inner))
    }

    pub fn array(inner: TypeRef) -> Self {
        TypeRef::Array(Box::new(inner))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map(Box::new(key), Box::new(value))
    }

    /// Parses a Rust type expression such as `Vec<Page<User>>`.
    pub fn parse(source: &str) -> Result<Self> {
        let ty: syn::Type = syn::parse_str(source).map_err(|e| {
            Error::InvalidArgument(format!("`{}` is not a type: {}", source, e))
        })?;
        Ok(Self::from_syn(&ty))
    }

    /// Converts a `syn` type into a `TypeRef`.
    ///
    /// Smart pointers and references are transparent, the std collections map
    /// onto [`TypeRef::Array`] / [`TypeRef::Map`], and trait objects become
    /// [`TypeRef::Dynamic`].
    pub fn from_syn(ty: &syn::Type) -> Self {
        match ty {
            syn::Type::Path(type_path) => Self::from_path(&type_path.path),
            syn::Type::Reference(reference) => Self::from_syn(&reference.elem),
            syn::Type::Paren(paren) => Self::from_syn(&paren.elem),
            syn::Type::Group(group) => Self::from_syn(&group.elem),
            syn::Type::Slice(slice) => Self::array(Self::from_syn(&slice.elem)),
            syn::Type::Array(array) => Self::array(Self::from_syn(&array.elem)),
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => TypeRef::Unit,
            syn::Type::TraitObject(object) => Self::Dynamic(bound_name(object.bounds.iter())),
            syn::Type::ImplTrait(imp) => Self::Dynamic(bound_name(imp.bounds.iter())),
            _ => Self::named("<unsupported>"),
        }
    }

    fn from_path(path: &syn::Path) -> Self {
        let Some(segment) = path.segments.last() else {
            return Self::named("<unsupported>");
        };
        let name = segment.ident.to_string();
        let mut args: Vec<TypeRef> = Vec::new();
        if let syn::PathArguments::AngleBracketed(bracketed) = &segment.arguments {
            for arg in &bracketed.args {
                if let syn::GenericArgument::Type(inner) = arg {
                    args.push(Self::from_syn(inner));
                }
            }
        }

        match (name.as_str(), args.len()) {
            ("Option", 1) => Self::Option(Box::new(args.remove(0))),
            ("Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "IndexSet", 1) => {
                Self::Array(Box::new(args.remove(0)))
            }
            ("HashMap" | "BTreeMap" | "IndexMap", 2) => {
                let value = args.remove(1);
                let key = args.remove(0);
                Self::map(key, value)
            }
            ("Box" | "Arc" | "Rc" | "Cow", _) if !args.is_empty() => args.remove(args.len() - 1),
            _ => Self::Named { name, args },
        }
    }

    /// A flat identifier for this type, used when a schema name needs to be
    /// disambiguated by its generic arguments.
    pub fn name_token(&self) -> String {
        match self {
            TypeRef::Named { name, args } => {
                let mut token = name.to_upper_camel_case();
                for arg in args {
                    token.push_str(&arg.name_token());
                }
                token
            }
            TypeRef::Option(inner) => inner.name_token(),
            TypeRef::Array(inner) => format!("{}List", inner.name_token()),
            TypeRef::Map(_, value) => format!("{}Map", value.name_token()),
            TypeRef::Unit => "Unit".to_string(),
            TypeRef::Dynamic(name) => name.to_upper_camel_case(),
        }
    }
}

fn bound_name<'a>(bounds: impl Iterator<Item = &'a syn::TypeParamBound>) -> String {
    for bound in bounds {
        if let syn::TypeParamBound::Trait(trait_bound) = bound {
            if let Some(segment) = trait_bound.path.segments.last() {
                return segment.ident.to_string();
            }
        }
    }
    "<dyn>".to_string()
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeRef::Option(inner) => write!(f, "Option<{}>", inner),
            TypeRef::Array(inner) => write!(f, "Vec<{}>", inner),
            TypeRef::Map(key, value) => write!(f, "Map<{}, {}>", key, value),
            TypeRef::Unit => write!(f, "()"),
            TypeRef::Dynamic(name) => write!(f, "dyn {}", name),
        }
    }
}

/// The declared name of an object, union or enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Name with generic arguments elided (`Page`)
    pub base: String,
    /// Name tokens of the generic arguments (`["User"]`)
    pub args: Vec<String>,
    /// Full display form (`Page<User>`), unique per instantiation
    pub display: String,
}

impl TypeName {
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            base: name.clone(),
            args: Vec::new(),
            display: name,
        }
    }

    pub fn instantiated(base: &str, args: &[TypeRef]) -> Self {
        if args.is_empty() {
            return Self::plain(base);
        }
        Self {
            base: base.to_string(),
            args: args.iter().map(TypeRef::name_token).collect(),
            display: TypeRef::generic(base, args.to_vec()).to_string(),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Terminal types, keeping their exact numeric kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    Uuid,
    DateTime,
    Date,
}

impl PrimitiveType {
    /// Whether values of this kind serialize as JSON strings (usable as map keys).
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            PrimitiveType::String
                | PrimitiveType::Char
                | PrimitiveType::Uuid
                | PrimitiveType::DateTime
                | PrimitiveType::Date
        )
    }
}

/// A resolved, immutable description of a type's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    Array(Box<TypeDescriptor>),
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Object(ObjectDescriptor),
    Union(UnionDescriptor),
    /// Unit-only enum serialized as one of a fixed set of strings
    Enum(EnumDescriptor),
    /// Placeholder for a type whose resolution is still in progress
    Reference(TypeName),
    Unit,
}

impl TypeDescriptor {
    /// The declared name, for named shapes.
    pub fn name(&self) -> Option<&TypeName> {
        match self {
            TypeDescriptor::Object(object) => Some(&object.name),
            TypeDescriptor::Union(union) => Some(&union.name),
            TypeDescriptor::Enum(enumeration) => Some(&enumeration.name),
            TypeDescriptor::Reference(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectDescriptor> {
        match self {
            TypeDescriptor::Object(object) => Some(object),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    pub name: TypeName,
    pub description: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(name: TypeName) -> Self {
        Self {
            name,
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl PartialEq for ObjectDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.fields == other.fields
    }
}

/// One field of an object. `required` and `nullable` are independent:
/// a field may be required yet accept `null`, or optional yet non-null.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub descriptor: TypeDescriptor,
    pub required: bool,
    pub nullable: bool,
    pub description: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            required: true,
            nullable: false,
            description: None,
        }
    }
}

/// A closed polymorphic type: one object shape per tag, selected on the wire
/// by the string field named `discriminator`.
#[derive(Debug, Clone)]
pub struct UnionDescriptor {
    pub name: TypeName,
    pub description: Option<String>,
    pub discriminator: String,
    pub variants: Vec<VariantDescriptor>,
}

impl PartialEq for UnionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
            && self.discriminator == other.discriminator
            && self.variants == other.variants
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantDescriptor {
    pub tag: String,
    pub object: ObjectDescriptor,
}

#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub name: TypeName,
    pub description: Option<String>,
    pub values: Vec<String>,
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.values == other.values
    }
}
