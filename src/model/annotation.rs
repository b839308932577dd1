use super::{BinaryName, FieldType};
use std::collections::HashMap;

/// One annotation on a class, field, or method
#[derive(Clone, PartialEq, Debug)]
pub struct AnnotationNode {
    /// Annotation type
    pub type_name: BinaryName,

    /// Attribute name/value pairs, in declaration order
    pub values: Vec<(String, AnnotationValue)>,
}

/// Value of one annotation attribute
///
/// This is a plain immutable tree: nested annotations and array values are modeled structurally,
/// so no reflective dispatch is needed to read attribute values back out.
#[derive(Clone, PartialEq, Debug)]
pub enum AnnotationValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Str(String),
    Class(FieldType),
    Enum {
        type_name: BinaryName,
        constant: String,
    },
    Nested(AnnotationNode),
    Array(Vec<AnnotationValue>),
}

impl AnnotationNode {
    /// Look up an attribute value by name
    pub fn value(&self, name: &str) -> Option<&AnnotationValue> {
        self.values
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value)
    }
}

/// Merge annotations from several ordered sources, dropping duplicates by type
///
/// When the same annotation type occurs more than once (across sources or within one), the later
/// occurrence wins and takes the position where it last appeared. Sources are processed in the
/// order given, so a later source overrides an earlier one.
pub fn merge_annotations(sources: &[&[AnnotationNode]]) -> Vec<AnnotationNode> {
    let all: Vec<&AnnotationNode> = sources.iter().flat_map(|s| s.iter()).collect();

    let mut last_index: HashMap<&BinaryName, usize> = HashMap::new();
    for (index, annotation) in all.iter().enumerate() {
        last_index.insert(&annotation.type_name, index);
    }

    all.iter()
        .enumerate()
        .filter(|(index, annotation)| last_index[&annotation.type_name] == *index)
        .map(|(_, annotation)| (*annotation).clone())
        .collect()
}
