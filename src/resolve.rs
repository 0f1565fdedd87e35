//! This module contains the boundary traits through which the engine consumes
//! the out-of-scope front ends: descriptor resolution (type and method
//! metadata) and source resolution (method bodies).
//!
//! The traits are object safe so a driver can plug in AST-derived,
//! symbol-table-derived, or classfile-derived backends. An in-memory
//! [`MapResolver`] ships for tests and embedding.

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use crate::{
    ast,
    error::execution::{Error, Result},
    signature::{ClassSignature, QualifiedMethodSignature},
};

/// The metadata the engine needs about a method before invoking it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDescriptor {
    /// The fully-qualified signature of the method.
    pub signature: QualifiedMethodSignature,

    /// Whether the method is static.
    pub is_static: bool,

    /// The declared parameter names, in declaration order.
    ///
    /// Used to bind arguments into the callee's locals when the method has an
    /// interpretable body.
    pub parameter_names: Vec<String>,
}

/// A resolver for type and method metadata.
pub trait DescriptorResolver
where
    Self: Debug + Send + Sync,
{
    /// Resolves the descriptor for the provided method signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvableDescriptor`] if no backend can resolve
    /// the signature.
    fn resolve_method(&self, signature: &QualifiedMethodSignature) -> Result<MethodDescriptor>;

    /// Gets the direct superclass of the provided class, or [`None`] for
    /// `java/lang/Object` and for classes whose hierarchy is unknown.
    fn superclass(&self, class: &ClassSignature) -> Option<ClassSignature>;
}

/// A resolver for method bodies.
pub trait SourceResolver
where
    Self: Debug + Send + Sync,
{
    /// Gets the body of the provided method, or [`None`] when no body is
    /// available and the call must be treated as opaque.
    fn method_body(&self, signature: &QualifiedMethodSignature) -> Option<Arc<ast::Block>>;

    /// Gets the raw bytecode of the provided method, for methods that exist
    /// only in compiled form.
    ///
    /// Consulted only when [`Self::method_body`] returns [`None`].
    fn method_bytecode(&self, signature: &QualifiedMethodSignature) -> Option<Arc<[u8]>> {
        let _ = signature;
        None
    }

    /// Gets the instance field initializers of the provided class, run when
    /// an instance is created concretely.
    ///
    /// Each entry is a field name, its type, and its initializer expression.
    fn field_initializers(&self, class: &ClassSignature) -> Vec<ast::FieldInitializer> {
        let _ = class;
        Vec::new()
    }
}

/// An in-memory implementation of both resolver traits, backed by maps.
#[derive(Clone, Debug, Default)]
pub struct MapResolver {
    methods: BTreeMap<String, MethodDescriptor>,
    bodies: BTreeMap<String, Arc<ast::Block>>,
    bytecode: BTreeMap<String, Arc<[u8]>>,
    superclasses: BTreeMap<ClassSignature, ClassSignature>,
    initializers: BTreeMap<ClassSignature, Vec<ast::FieldInitializer>>,
}

impl MapResolver {
    /// Constructs a new, empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method descriptor, with its body if one is available.
    pub fn add_method(
        &mut self,
        descriptor: MethodDescriptor,
        body: Option<ast::Block>,
    ) -> &mut Self {
        let key = descriptor.signature.to_string();
        if let Some(body) = body {
            self.bodies.insert(key.clone(), Arc::new(body));
        }
        self.methods.insert(key, descriptor);
        self
    }

    /// Registers raw bytecode for a method descriptor.
    pub fn add_bytecode(&mut self, descriptor: MethodDescriptor, code: Vec<u8>) -> &mut Self {
        let key = descriptor.signature.to_string();
        self.bytecode.insert(key.clone(), Arc::from(code.into_boxed_slice()));
        self.methods.insert(key, descriptor);
        self
    }

    /// Registers a superclass relationship.
    pub fn add_superclass(&mut self, class: ClassSignature, superclass: ClassSignature) -> &mut Self {
        self.superclasses.insert(class, superclass);
        self
    }

    /// Registers the instance field initializers of a class.
    pub fn add_field_initializers(
        &mut self,
        class: ClassSignature,
        initializers: Vec<ast::FieldInitializer>,
    ) -> &mut Self {
        self.initializers.insert(class, initializers);
        self
    }
}

impl DescriptorResolver for MapResolver {
    fn resolve_method(&self, signature: &QualifiedMethodSignature) -> Result<MethodDescriptor> {
        self.methods.get(&signature.to_string()).cloned().ok_or_else(|| {
            Error::UnresolvableDescriptor {
                signature: signature.to_string(),
            }
        })
    }

    fn superclass(&self, class: &ClassSignature) -> Option<ClassSignature> {
        self.superclasses.get(class).cloned()
    }
}

impl SourceResolver for MapResolver {
    fn method_body(&self, signature: &QualifiedMethodSignature) -> Option<Arc<ast::Block>> {
        self.bodies.get(&signature.to_string()).cloned()
    }

    fn method_bytecode(&self, signature: &QualifiedMethodSignature) -> Option<Arc<[u8]>> {
        self.bytecode.get(&signature.to_string()).cloned()
    }

    fn field_initializers(&self, class: &ClassSignature) -> Vec<ast::FieldInitializer> {
        self.initializers.get(class).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::execution::Error,
        resolve::{DescriptorResolver, MapResolver, MethodDescriptor},
        signature::{
            ClassSignature,
            MethodSignature,
            PrimitiveKind,
            QualifiedMethodSignature,
            TypeSignature,
        },
    };

    fn signature() -> QualifiedMethodSignature {
        QualifiedMethodSignature::new(
            ClassSignature::new("foo/Bar"),
            MethodSignature::new("run", vec![], TypeSignature::Primitive(PrimitiveKind::Void)),
        )
    }

    #[test]
    fn unknown_methods_are_unresolvable() {
        let resolver = MapResolver::new();
        assert!(matches!(
            resolver.resolve_method(&signature()),
            Err(Error::UnresolvableDescriptor { .. })
        ));
    }

    #[test]
    fn registered_methods_resolve() -> anyhow::Result<()> {
        let mut resolver = MapResolver::new();
        resolver.add_method(
            MethodDescriptor {
                signature: signature(),
                is_static: true,
                parameter_names: vec![],
            },
            None,
        );

        let descriptor = resolver.resolve_method(&signature())?;
        assert!(descriptor.is_static);
        Ok(())
    }
}
