//! This module contains the signature vocabulary used throughout the engine to
//! name types, methods, and the classes that declare them.
//!
//! Signatures render to (and parse from) the JVM descriptor grammar
//! (`Ljava/lang/String;`, `[I`, `(IJ)V`), which keeps them stable as map keys
//! and as the coarse grouping keys used by the graph comparator.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The primitive type kinds of the modeled language, including `void` for
/// method return types.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveKind {
    /// Gets the single-character descriptor code for this primitive kind.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Byte => 'B',
            Self::Char => 'C',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Void => 'V',
        }
    }

    /// Gets the primitive kind corresponding to the provided descriptor
    /// `code`, if there is one.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        let kind = match code {
            'Z' => Self::Boolean,
            'B' => Self::Byte,
            'C' => Self::Char,
            'S' => Self::Short,
            'I' => Self::Int,
            'J' => Self::Long,
            'F' => Self::Float,
            'D' => Self::Double,
            'V' => Self::Void,
            _ => return None,
        };
        Some(kind)
    }
}

/// The signature of a class type, carrying its slash-qualified name
/// (`java/lang/String`).
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ClassSignature {
    name: String,
}

impl ClassSignature {
    /// Constructs a new class signature for the slash-qualified `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is written in descriptor form (`L…;`) or contains an
    /// array dimension, as this indicates a programmer error at the call site.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(
            !(name.starts_with('L') && name.ends_with(';')) && !name.contains('['),
            "Class names must be written slash-qualified, not as descriptors: {name}"
        );
        Self { name }
    }

    /// Gets the slash-qualified name of the class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signature of `java/lang/Object`.
    #[must_use]
    pub fn object() -> Self {
        Self::new("java/lang/Object")
    }

    /// The signature of `java/lang/String`.
    #[must_use]
    pub fn string() -> Self {
        Self::new("java/lang/String")
    }

    /// The signature of `java/lang/Class`.
    #[must_use]
    pub fn class() -> Self {
        Self::new("java/lang/Class")
    }

    /// Gets the boxed wrapper class for the provided primitive kind, or
    /// [`None`] for `void`.
    #[must_use]
    pub fn boxed(kind: PrimitiveKind) -> Option<Self> {
        let name = match kind {
            PrimitiveKind::Boolean => "java/lang/Boolean",
            PrimitiveKind::Byte => "java/lang/Byte",
            PrimitiveKind::Char => "java/lang/Character",
            PrimitiveKind::Short => "java/lang/Short",
            PrimitiveKind::Int => "java/lang/Integer",
            PrimitiveKind::Long => "java/lang/Long",
            PrimitiveKind::Float => "java/lang/Float",
            PrimitiveKind::Double => "java/lang/Double",
            PrimitiveKind::Void => return None,
        };
        Some(Self::new(name))
    }

    /// Gets the primitive kind that this class boxes, if it is one of the
    /// boxed wrapper classes.
    #[must_use]
    pub fn unboxed(&self) -> Option<PrimitiveKind> {
        let kind = match self.name.as_str() {
            "java/lang/Boolean" => PrimitiveKind::Boolean,
            "java/lang/Byte" => PrimitiveKind::Byte,
            "java/lang/Character" => PrimitiveKind::Char,
            "java/lang/Short" => PrimitiveKind::Short,
            "java/lang/Integer" => PrimitiveKind::Int,
            "java/lang/Long" => PrimitiveKind::Long,
            "java/lang/Float" => PrimitiveKind::Float,
            "java/lang/Double" => PrimitiveKind::Double,
            _ => return None,
        };
        Some(kind)
    }

    /// Checks whether this class is `java/lang/String`.
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.name == "java/lang/String"
    }
}

impl Display for ClassSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{};", self.name)
    }
}

/// The signature of any type the engine can name.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TypeSignature {
    /// A primitive type.
    Primitive(PrimitiveKind),

    /// A class type.
    Class(ClassSignature),

    /// An array type with the given component type.
    Array(Box<TypeSignature>),
}

impl TypeSignature {
    /// Constructs the signature for an array of this type with the requested
    /// number of `dimensions`.
    ///
    /// # Panics
    ///
    /// Panics if `dimensions` is zero, as this is a programmer error.
    #[must_use]
    pub fn array_of(self, dimensions: usize) -> Self {
        assert!(dimensions > 0, "Array dimensions must be greater than 0");
        let mut signature = self;
        for _ in 0..dimensions {
            signature = Self::Array(Box::new(signature));
        }
        signature
    }

    /// Checks whether this signature names a reference type (a class or an
    /// array).
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Class(_) | Self::Array(_))
    }

    /// Checks whether this signature is the `void` primitive.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Primitive(PrimitiveKind::Void))
    }

    /// Gets the class signature if this signature names a class type.
    #[must_use]
    pub fn as_class(&self) -> Option<&ClassSignature> {
        match self {
            Self::Class(class) => Some(class),
            _ => None,
        }
    }
}

impl From<PrimitiveKind> for TypeSignature {
    fn from(value: PrimitiveKind) -> Self {
        Self::Primitive(value)
    }
}

impl From<ClassSignature> for TypeSignature {
    fn from(value: ClassSignature) -> Self {
        Self::Class(value)
    }
}

impl Display for TypeSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{}", kind.code()),
            Self::Class(class) => write!(f, "{class}"),
            Self::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// The unqualified signature of a method: its name, argument types, and
/// return type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct MethodSignature {
    /// The name of the method.
    pub name: String,

    /// The declared argument types, in declaration order.
    pub argument_types: Vec<TypeSignature>,

    /// The declared return type.
    pub return_type: TypeSignature,
}

impl MethodSignature {
    /// Constructs a new method signature from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        argument_types: Vec<TypeSignature>,
        return_type: TypeSignature,
    ) -> Self {
        let name = name.into();
        Self {
            name,
            argument_types,
            return_type,
        }
    }
}

impl Display for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        for argument in &self.argument_types {
            write!(f, "{argument}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// The fully-qualified signature of a method: the class that declares it plus
/// its method signature.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct QualifiedMethodSignature {
    /// The class declaring the method.
    pub declaring_class: ClassSignature,

    /// The method's own signature.
    pub method: MethodSignature,
}

impl QualifiedMethodSignature {
    /// Constructs a new qualified method signature from its parts.
    #[must_use]
    pub fn new(declaring_class: ClassSignature, method: MethodSignature) -> Self {
        Self {
            declaring_class,
            method,
        }
    }
}

impl Display for QualifiedMethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.declaring_class, self.method)
    }
}

/// Errors that can occur when parsing descriptor strings into signatures.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    #[error("The descriptor {descriptor:?} ended before a complete signature was read")]
    UnexpectedEnd { descriptor: String },

    #[error("Unknown type code {code:?} in descriptor {descriptor:?}")]
    UnknownTypeCode { code: char, descriptor: String },

    #[error("Trailing characters after a complete signature in descriptor {descriptor:?}")]
    TrailingInput { descriptor: String },
}

/// Parses a single type signature from a descriptor string such as `I`,
/// `Ljava/lang/String;`, or `[[D`.
///
/// # Errors
///
/// Returns [`Err`] if the descriptor is not a single well-formed type
/// signature.
pub fn parse_type(descriptor: &str) -> Result<TypeSignature, ParseError> {
    let mut chars = descriptor.chars().peekable();
    let signature = parse_type_from(&mut chars, descriptor)?;
    if chars.next().is_some() {
        return Err(ParseError::TrailingInput {
            descriptor: descriptor.to_string(),
        });
    }
    Ok(signature)
}

/// Parses a method type descriptor such as `(I[J)V` into its argument types
/// and return type.
///
/// # Errors
///
/// Returns [`Err`] if the descriptor is not a well-formed method type
/// descriptor.
pub fn parse_method_type(
    descriptor: &str,
) -> Result<(Vec<TypeSignature>, TypeSignature), ParseError> {
    let mut chars = descriptor.chars().peekable();
    if chars.next() != Some('(') {
        return Err(ParseError::UnknownTypeCode {
            code: descriptor.chars().next().unwrap_or('\0'),
            descriptor: descriptor.to_string(),
        });
    }

    let mut argument_types = Vec::new();
    loop {
        match chars.peek() {
            Some(')') => {
                chars.next();
                break;
            }
            Some(_) => argument_types.push(parse_type_from(&mut chars, descriptor)?),
            None => {
                return Err(ParseError::UnexpectedEnd {
                    descriptor: descriptor.to_string(),
                })
            }
        }
    }

    let return_type = parse_type_from(&mut chars, descriptor)?;
    if chars.next().is_some() {
        return Err(ParseError::TrailingInput {
            descriptor: descriptor.to_string(),
        });
    }

    Ok((argument_types, return_type))
}

fn parse_type_from(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    descriptor: &str,
) -> Result<TypeSignature, ParseError> {
    let Some(code) = chars.next() else {
        return Err(ParseError::UnexpectedEnd {
            descriptor: descriptor.to_string(),
        });
    };

    match code {
        '[' => {
            let component = parse_type_from(chars, descriptor)?;
            Ok(TypeSignature::Array(Box::new(component)))
        }
        'L' => {
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == ';' {
                    return Ok(TypeSignature::Class(ClassSignature::new(name)));
                }
                name.push(c);
            }
            Err(ParseError::UnexpectedEnd {
                descriptor: descriptor.to_string(),
            })
        }
        code => PrimitiveKind::from_code(code).map(TypeSignature::Primitive).ok_or_else(|| {
            ParseError::UnknownTypeCode {
                code,
                descriptor: descriptor.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod test {
    use crate::signature::{
        parse_method_type,
        parse_type,
        ClassSignature,
        MethodSignature,
        ParseError,
        PrimitiveKind,
        QualifiedMethodSignature,
        TypeSignature,
    };

    #[test]
    fn renders_signatures_in_descriptor_form() {
        let string = TypeSignature::Class(ClassSignature::string());
        assert_eq!(string.to_string(), "Ljava/lang/String;");

        let ints = TypeSignature::Primitive(PrimitiveKind::Int).array_of(2);
        assert_eq!(ints.to_string(), "[[I");

        let method = QualifiedMethodSignature::new(
            ClassSignature::new("foo/Bar"),
            MethodSignature::new(
                "baz",
                vec![
                    TypeSignature::Primitive(PrimitiveKind::Int),
                    TypeSignature::Primitive(PrimitiveKind::Long),
                ],
                TypeSignature::Primitive(PrimitiveKind::Void),
            ),
        );
        assert_eq!(method.to_string(), "Lfoo/Bar;baz(IJ)V");
    }

    #[test]
    fn parses_the_descriptors_it_renders() -> anyhow::Result<()> {
        for descriptor in ["I", "Z", "[D", "Ljava/lang/String;", "[[Lfoo/Bar;"] {
            let parsed = parse_type(descriptor)?;
            assert_eq!(parsed.to_string(), descriptor);
        }

        let (arguments, return_type) = parse_method_type("(I[JLjava/lang/String;)V")?;
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments[1].to_string(), "[J");
        assert!(return_type.is_void());

        Ok(())
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(matches!(
            parse_type("Q"),
            Err(ParseError::UnknownTypeCode { code: 'Q', .. })
        ));
        assert!(matches!(
            parse_type("Ljava/lang/String"),
            Err(ParseError::UnexpectedEnd { .. })
        ));
        assert!(matches!(parse_type("II"), Err(ParseError::TrailingInput { .. })));
    }

    #[test]
    fn maps_boxed_wrappers_to_their_primitives() {
        let boxed = ClassSignature::boxed(PrimitiveKind::Int).unwrap();
        assert_eq!(boxed.name(), "java/lang/Integer");
        assert_eq!(boxed.unboxed(), Some(PrimitiveKind::Int));
        assert_eq!(ClassSignature::boxed(PrimitiveKind::Void), None);
        assert_eq!(ClassSignature::object().unboxed(), None);
    }
}
