//! Static field-descriptor tables describing which fields of a document are
//! protected, and the walker that visits them.

use crate::annotation::Annotation;
use crate::error::Error;
use serde_json::{Map, Value};

/// Description of a document shape: its annotated and nested fields.
///
/// Fields that are neither annotated nor nested do not need to be listed;
/// they are copied through untouched. A shape is built once per document type
/// and reused for every call.
///
/// # Example
///
/// ```
/// use fieldcrypt::shape::{FieldDescriptor, Shape};
///
/// let address = Shape::new(vec![FieldDescriptor::annotated("zip", "aes256,enc,mac")]);
/// let user = Shape::new(vec![
///     FieldDescriptor::annotated("ssn", "rsa2048,pub,priv"),
///     FieldDescriptor::nested("address", address),
/// ]);
///
/// assert_eq!(user.fields().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shape {
    fields: Vec<FieldDescriptor>,
}

impl Shape {
    /// Creates a shape from its field descriptors.
    #[must_use]
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Appends a field descriptor.
    #[must_use]
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the field descriptors in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// What the engine does with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// The field's whole value is sealed with the annotated provider.
    Annotated(Annotation),
    /// The field holds a sub-document (or an array of them) with its own shape.
    Nested(Shape),
}

/// One entry of a [`Shape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
}

impl FieldDescriptor {
    /// Describes a field protected by the given annotation string.
    #[must_use]
    pub fn annotated(name: impl Into<String>, annotation: &str) -> Self {
        Self { name: name.into(), kind: FieldKind::Annotated(Annotation::parse(annotation)) }
    }

    /// Describes a field holding a sub-document of the given shape.
    #[must_use]
    pub fn nested(name: impl Into<String>, shape: Shape) -> Self {
        Self { name: name.into(), kind: FieldKind::Nested(shape) }
    }

    /// Returns the field name as it appears in the document.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns what the engine does with this field.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Returns the annotation, if the field is annotated.
    #[must_use]
    pub const fn annotation(&self) -> Option<&Annotation> {
        match &self.kind {
            FieldKind::Annotated(annotation) => Some(annotation),
            FieldKind::Nested(_) => None,
        }
    }
}

/// Types with a statically known document shape.
///
/// Usually derived with `fieldcrypt_derive::Encryptable`, which builds the
/// shape once into a `static`.
pub trait Encryptable {
    /// Returns the shape shared by every value of this type.
    fn shape() -> &'static Shape;
}

impl<T: Encryptable> Encryptable for Option<T> {
    fn shape() -> &'static Shape {
        T::shape()
    }
}

impl<T: Encryptable> Encryptable for Vec<T> {
    fn shape() -> &'static Shape {
        T::shape()
    }
}

impl<T: Encryptable> Encryptable for Box<T> {
    fn shape() -> &'static Shape {
        T::shape()
    }
}

/// Per-field operation applied by [`walk`].
pub trait FieldVisitor {
    /// Transforms the annotated field `name` of `object`.
    ///
    /// `path` is the dotted location of the field from the document root, for
    /// diagnostics only.
    ///
    /// # Errors
    ///
    /// Any error aborts the walk and is returned unchanged.
    fn visit_annotated(
        &mut self,
        object: &mut Map<String, Value>,
        name: &str,
        annotation: &Annotation,
        path: &str,
    ) -> Result<(), Error>;
}

/// Walks `object` depth-first along `shape`, calling the visitor for every
/// annotated field.
///
/// Nested fields are entered when their value is an object, and each object
/// element is entered when it is an array. Any other value (including `null`
/// or an absent field) is left alone. Fields are located by name, so the key
/// order of the underlying document is irrelevant.
///
/// # Errors
///
/// Returns the first error reported by the visitor.
pub fn walk<V: FieldVisitor + ?Sized>(
    shape: &Shape,
    object: &mut Map<String, Value>,
    visitor: &mut V,
) -> Result<(), Error> {
    walk_at(shape, object, visitor, "")
}

fn walk_at<V: FieldVisitor + ?Sized>(
    shape: &Shape,
    object: &mut Map<String, Value>,
    visitor: &mut V,
    prefix: &str,
) -> Result<(), Error> {
    for field in shape.fields() {
        let path = if prefix.is_empty() {
            field.name().to_string()
        } else {
            format!("{prefix}.{}", field.name())
        };

        match field.kind() {
            FieldKind::Annotated(annotation) => {
                visitor.visit_annotated(object, field.name(), annotation, &path)?;
            }
            FieldKind::Nested(nested) => match object.get_mut(field.name()) {
                Some(Value::Object(child)) => walk_at(nested, child, visitor, &path)?,
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter_mut().enumerate() {
                        if let Value::Object(child) = item {
                            walk_at(nested, child, visitor, &format!("{path}[{index}]"))?;
                        }
                    }
                }
                _ => {}
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records visited paths and uppercases string values.
    #[derive(Default)]
    struct Recorder {
        visited: Vec<String>,
    }

    impl FieldVisitor for Recorder {
        fn visit_annotated(
            &mut self,
            object: &mut Map<String, Value>,
            name: &str,
            annotation: &Annotation,
            path: &str,
        ) -> Result<(), Error> {
            if annotation.algorithm() == "fail" {
                return Err(Error::ProviderNotFound("fail".to_string()));
            }
            if let Some(Value::String(s)) = object.get_mut(name) {
                *s = s.to_uppercase();
            }
            self.visited.push(path.to_string());
            Ok(())
        }
    }

    fn user_shape() -> Shape {
        let address = Shape::new(vec![FieldDescriptor::annotated("zip", "x")]);
        Shape::new(vec![
            FieldDescriptor::annotated("name", "x"),
            FieldDescriptor::nested("address", address.clone()),
            FieldDescriptor::nested("previous", address),
        ])
    }

    #[test]
    fn test_walk_visits_nested_and_arrays() {
        let mut doc = json!({
            "name": "alice",
            "plain": "untouched",
            "address": { "zip": "abc", "city": "x" },
            "previous": [{ "zip": "def" }, "skip", { "zip": "ghi" }],
        });

        let mut recorder = Recorder::default();
        walk(&user_shape(), doc.as_object_mut().unwrap(), &mut recorder).unwrap();

        assert_eq!(
            recorder.visited,
            ["name", "address.zip", "previous[0].zip", "previous[2].zip"]
        );
        assert_eq!(doc["name"], "ALICE");
        assert_eq!(doc["plain"], "untouched");
        assert_eq!(doc["address"]["zip"], "ABC");
        assert_eq!(doc["address"]["city"], "x");
        assert_eq!(doc["previous"][1], "skip");
        assert_eq!(doc["previous"][2]["zip"], "GHI");
    }

    #[test]
    fn test_walk_skips_null_and_missing_nested() {
        let mut doc = json!({ "name": "bob", "address": null });

        let mut recorder = Recorder::default();
        walk(&user_shape(), doc.as_object_mut().unwrap(), &mut recorder).unwrap();

        assert_eq!(recorder.visited, ["name"]);
    }

    #[test]
    fn test_walk_stops_on_first_error() {
        let shape = Shape::new(vec![
            FieldDescriptor::annotated("a", "x"),
            FieldDescriptor::annotated("b", "fail"),
            FieldDescriptor::annotated("c", "x"),
        ]);
        let mut doc = json!({ "a": "1", "b": "2", "c": "3" });

        let mut recorder = Recorder::default();
        let result = walk(&shape, doc.as_object_mut().unwrap(), &mut recorder);

        assert!(result.is_err());
        assert_eq!(recorder.visited, ["a"]);
    }

    #[test]
    fn test_descriptor_accessors() {
        let field = FieldDescriptor::annotated("message", "aes256,k1,k2");
        assert_eq!(field.name(), "message");
        assert_eq!(field.annotation().map(Annotation::algorithm), Some("aes256"));

        let nested = FieldDescriptor::nested("sub", Shape::default());
        assert!(nested.annotation().is_none());
        assert_eq!(Shape::default().with_field(nested).fields().len(), 1);
    }
}
