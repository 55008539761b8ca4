//! Structured parameter values exchanged during negotiation.
//!
//! An [`Object`] is a typed bag of [`Property`] values. Values are either
//! fixed or a [`Choice`] (a range or an enumeration), and two objects can be
//! intersected: this is how a host narrows a candidate with its own filter.

#![forbid(unsafe_code)]

use crate::param::ParamKind;
use std::cmp::Ordering;

/// The shape of an object, independent of the parameter it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    PropInfo,
    Props,
    Format,
    ParamBuffers,
    ParamMeta,
    ParamIo,
}

/// Property keys understood by the node.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    MediaType,
    MediaSubtype,
    AudioFormat,
    AudioChannels,
    AudioRate,
    BuffersCount,
    BuffersBlocks,
    BuffersSize,
    BuffersStride,
    MetaType,
    MetaSize,
    IoId,
    IoSize,
    PropInfoName,
    PropInfoType,
    Volume,
}

/// How the values of a [`Choice`] are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    /// `[default, min, max]`
    Range,
    /// `[default, alternatives...]`
    Enum,
}

/// A set of acceptable scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub kind: ChoiceKind,
    pub values: Vec<Value>,
}

impl Choice {
    /// The preferred value.
    pub fn default_value(&self) -> Option<&Value> {
        self.values.first()
    }

    fn alternatives(&self) -> &[Value] {
        match self.values.len() {
            0 | 1 => &self.values,
            _ => &self.values[1..],
        }
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Id(u32),
    Int(i32),
    Float(f32),
    String(String),
    Choice(Choice),
}

impl Value {
    /// Integer range with a default.
    pub fn int_range(default: i32, min: i32, max: i32) -> Self {
        Value::Choice(Choice {
            kind: ChoiceKind::Range,
            values: vec![Value::Int(default), Value::Int(min), Value::Int(max)],
        })
    }

    /// Float range with a default.
    pub fn float_range(default: f32, min: f32, max: f32) -> Self {
        Value::Choice(Choice {
            kind: ChoiceKind::Range,
            values: vec![Value::Float(default), Value::Float(min), Value::Float(max)],
        })
    }

    /// Enumeration of ids; `default` is preferred.
    pub fn id_enum(default: u32, alternatives: &[u32]) -> Self {
        let mut values = Vec::with_capacity(alternatives.len() + 1);
        values.push(Value::Id(default));
        values.extend(alternatives.iter().map(|&id| Value::Id(id)));
        Value::Choice(Choice {
            kind: ChoiceKind::Enum,
            values,
        })
    }

    pub fn as_id(&self) -> Option<u32> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Value::Choice(_))
    }
}

/// One keyed value inside an [`Object`].
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: Key,
    pub value: Value,
}

/// A typed parameter object.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub object_type: ObjectType,
    pub id: ParamKind,
    pub properties: Vec<Property>,
}

impl Object {
    pub fn new(object_type: ObjectType, id: ParamKind) -> Self {
        Self {
            object_type,
            id,
            properties: Vec::new(),
        }
    }

    /// Builder-style property append.
    pub fn with(mut self, key: Key, value: Value) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a property.
    pub fn set(&mut self, key: Key, value: Value) {
        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(prop) => prop.value = value,
            None => self.properties.push(Property { key, value }),
        }
    }

    pub fn get(&self, key: Key) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }

    /// Intersect this object with `filter`.
    ///
    /// Properties present on both sides are narrowed to their common values;
    /// properties present on one side only are kept as they are. Returns
    /// `None` when the object types differ or any shared property has no
    /// common value.
    pub fn intersect(&self, filter: &Object) -> Option<Object> {
        if self.object_type != filter.object_type {
            return None;
        }
        let mut out = Object::new(self.object_type, self.id);
        for prop in &self.properties {
            let value = match filter.get(prop.key) {
                Some(other) => intersect_values(&prop.value, other)?,
                None => prop.value.clone(),
            };
            out.properties.push(Property {
                key: prop.key,
                value,
            });
        }
        for prop in &filter.properties {
            if self.get(prop.key).is_none() {
                out.properties.push(prop.clone());
            }
        }
        Some(out)
    }
}

/// A host-supplied filter applied to every enumerated candidate.
///
/// Returning `None` rejects the candidate; returning an object replaces it.
pub trait ParamFilter {
    fn apply(&self, candidate: Object) -> Option<Object>;
}

impl ParamFilter for Object {
    fn apply(&self, candidate: Object) -> Option<Object> {
        candidate.intersect(self)
    }
}

impl<F> ParamFilter for F
where
    F: Fn(&Object) -> Option<Object>,
{
    fn apply(&self, candidate: Object) -> Option<Object> {
        self(&candidate)
    }
}

/// Accept-or-reject filter built from a plain predicate.
pub struct Predicate<F>(pub F);

impl<F> ParamFilter for Predicate<F>
where
    F: Fn(&Object) -> bool,
{
    fn apply(&self, candidate: Object) -> Option<Object> {
        if (self.0)(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

fn scalar_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        _ => None,
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    scalar_cmp(a, b) == Some(Ordering::Equal)
}

fn in_range(v: &Value, min: &Value, max: &Value) -> bool {
    matches!(
        scalar_cmp(v, min),
        Some(Ordering::Greater | Ordering::Equal)
    ) && matches!(scalar_cmp(v, max), Some(Ordering::Less | Ordering::Equal))
}

/// Normalized view of a value: its kind and the values that define it.
enum Shape<'a> {
    Fixed(&'a Value),
    Range(&'a Value, &'a Value, &'a Value),
    Enum(&'a Value, &'a [Value]),
}

fn shape(value: &Value) -> Option<Shape<'_>> {
    match value {
        Value::Choice(choice) => match (choice.kind, choice.values.as_slice()) {
            (ChoiceKind::Range, [default, min, max, ..]) => Some(Shape::Range(default, min, max)),
            (ChoiceKind::Enum, [default, ..]) => Some(Shape::Enum(default, choice.alternatives())),
            _ => None,
        },
        other => Some(Shape::Fixed(other)),
    }
}

fn narrowed_enum(preferred: &Value, common: Vec<Value>) -> Option<Value> {
    match common.len() {
        0 => None,
        1 => common.into_iter().next(),
        _ => {
            let default = common
                .iter()
                .find(|v| scalar_eq(v, preferred))
                .unwrap_or(&common[0])
                .clone();
            let mut values = Vec::with_capacity(common.len() + 1);
            values.push(default);
            values.extend(common);
            Some(Value::Choice(Choice {
                kind: ChoiceKind::Enum,
                values,
            }))
        }
    }
}

fn intersect_values(candidate: &Value, filter: &Value) -> Option<Value> {
    let (Some(a), Some(b)) = (shape(candidate), shape(filter)) else {
        return None;
    };
    match (a, b) {
        (Shape::Fixed(x), Shape::Fixed(y)) => {
            if x == y || scalar_eq(x, y) {
                Some(x.clone())
            } else {
                None
            }
        }
        (Shape::Fixed(x), Shape::Enum(_, alts)) | (Shape::Enum(_, alts), Shape::Fixed(x)) => {
            alts.iter().any(|v| scalar_eq(v, x)).then(|| x.clone())
        }
        (Shape::Fixed(x), Shape::Range(_, min, max))
        | (Shape::Range(_, min, max), Shape::Fixed(x)) => in_range(x, min, max).then(|| x.clone()),
        (Shape::Enum(default, alts), Shape::Enum(_, other)) => {
            let common = alts
                .iter()
                .filter(|v| other.iter().any(|o| scalar_eq(v, o)))
                .fold(Vec::new(), |mut acc: Vec<Value>, v| {
                    if !acc.iter().any(|a| scalar_eq(a, v)) {
                        acc.push(v.clone());
                    }
                    acc
                });
            narrowed_enum(default, common)
        }
        (Shape::Enum(default, alts), Shape::Range(_, min, max))
        | (Shape::Range(_, min, max), Shape::Enum(default, alts)) => {
            let common = alts
                .iter()
                .filter(|v| in_range(v, min, max))
                .cloned()
                .collect();
            narrowed_enum(default, common)
        }
        (Shape::Range(default, min_a, max_a), Shape::Range(_, min_b, max_b)) => {
            let min = match scalar_cmp(min_a, min_b)? {
                Ordering::Less => min_b,
                _ => min_a,
            };
            let max = match scalar_cmp(max_a, max_b)? {
                Ordering::Greater => max_b,
                _ => max_a,
            };
            match scalar_cmp(min, max)? {
                Ordering::Greater => None,
                Ordering::Equal => Some(min.clone()),
                Ordering::Less => {
                    let default = if scalar_cmp(default, min)? == Ordering::Less {
                        min
                    } else if scalar_cmp(default, max)? == Ordering::Greater {
                        max
                    } else {
                        default
                    };
                    Some(Value::Choice(Choice {
                        kind: ChoiceKind::Range,
                        values: vec![default.clone(), min.clone(), max.clone()],
                    }))
                }
            }
        }
    }
}
