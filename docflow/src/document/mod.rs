//! The document model.
//!
//! A [`Document`] is an identified, mutable record of ordered fields. Each
//! field holds either a single value or an array of values; values are JSON
//! trees, so strings, numbers, booleans, instants (canonical RFC 3339 strings),
//! binary blobs (base64 strings) and nested objects all share one
//! representation. Documents may carry child documents, which travel with the
//! parent until a stage detaches them.
//!
//! The reserved names `id`, `runId`, `children`, `errors` and `.dropped` are
//! managed by dedicated methods and rejected by the generic field API.

mod path;
mod value;


use std::borrow::Cow;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::DocumentError;
use crate::utils::Timestamp;

pub use path::Segment;
pub use value::{Binary, IntoFieldValue};

/// Field holding the document id.
pub const ID_FIELD: &str = "id";
/// Field holding the run id.
pub const RUN_ID_FIELD: &str = "runId";
/// Field holding attached children in the wire form.
pub const CHILDREN_FIELD: &str = "children";
/// Field accumulating processing errors.
pub const ERRORS_FIELD: &str = "errors";
/// Field marking a dropped document in the wire form.
pub const DROPPED_FIELD: &str = ".dropped";

/// All names the generic field API refuses to touch.
pub const RESERVED_FIELDS: [&str; 5] = [
    ID_FIELD,
    RUN_ID_FIELD,
    CHILDREN_FIELD,
    ERRORS_FIELD,
    DROPPED_FIELD,
];

/// How [`Document::update`] treats an existing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Replace existing values.
    #[default]
    Overwrite,
    /// Add to existing values.
    Append,
    /// Leave an existing field untouched.
    Skip,
}

/// A unit of work flowing through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    run_id: Option<String>,
    fields: Map<String, Value>,
    children: Vec<Document>,
    dropped: bool,
}

impl Document {
    /// Creates a new empty document.
    pub fn new(id: impl Into<String>) -> Result<Self, DocumentError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DocumentError::EmptyId);
        }
        Ok(Self {
            id,
            run_id: None,
            fields: Map::new(),
            children: Vec::new(),
            dropped: false,
        })
    }

    /// Creates a new empty document that already belongs to a run.
    pub fn with_run_id(id: impl Into<String>, run_id: impl Into<String>) -> Result<Self, DocumentError> {
        let mut doc = Self::new(id)?;
        doc.run_id = Some(run_id.into());
        Ok(doc)
    }

    /// Returns the document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the run id, if the document has been published.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Sets the run id. A document joins a run at most once.
    pub fn initialize_run_id(&mut self, run_id: impl Into<String>) -> Result<(), DocumentError> {
        if self.run_id.is_some() {
            return Err(DocumentError::RunIdAlreadySet(self.id.clone()));
        }
        self.run_id = Some(run_id.into());
        Ok(())
    }

    /// Removes the run id.
    pub fn clear_run_id(&mut self) {
        self.run_id = None;
    }

    /// Adopts the run id of `parent` unless this document already has one.
    pub(crate) fn inherit_run_id(&mut self, parent: &Self) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&parent.run_id);
        }
    }

    /// Returns a copy of this document under a different id.
    pub fn clone_with_new_id(&self, id: impl Into<String>) -> Result<Self, DocumentError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DocumentError::EmptyId);
        }
        Ok(Self { id, ..self.clone() })
    }

    fn check_writable(name: &str) -> Result<(), DocumentError> {
        if RESERVED_FIELDS.contains(&name) {
            return Err(DocumentError::ReservedField(name.to_string()));
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Cow<'_, Value>> {
        match name {
            ID_FIELD => Some(Cow::Owned(Value::String(self.id.clone()))),
            RUN_ID_FIELD => self
                .run_id
                .as_ref()
                .map(|run_id| Cow::Owned(Value::String(run_id.clone()))),
            _ => self.fields.get(name).map(Cow::Borrowed),
        }
    }

    // ---- inspection ----

    /// Whether the document has the field.
    pub fn has(&self, name: &str) -> bool {
        match name {
            ID_FIELD => true,
            RUN_ID_FIELD => self.run_id.is_some(),
            CHILDREN_FIELD => self.has_children(),
            DROPPED_FIELD => self.dropped,
            _ => self.fields.contains_key(name),
        }
    }

    /// Whether the document has the field with a non-null value.
    pub fn has_non_null(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|v| !v.is_null())
    }

    /// Whether the field holds an array of values.
    pub fn is_multi_valued(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(Value::is_array)
    }

    /// Number of values in the field: 0 when absent, 1 when single-valued.
    pub fn length(&self, name: &str) -> usize {
        match self.lookup(name).as_deref() {
            None => 0,
            Some(Value::Array(items)) => items.len(),
            Some(_) => 1,
        }
    }

    /// Names of the user fields in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|name| *name != ERRORS_FIELD)
    }

    // ---- mutation ----

    /// Sets a field to a single value, replacing anything stored.
    pub fn set_field(&mut self, name: &str, value: impl IntoFieldValue) -> Result<(), DocumentError> {
        Self::check_writable(name)?;
        self.fields.insert(name.to_string(), value.into_field_value());
        Ok(())
    }

    /// Adds a value to a field, converting it to multi-valued.
    ///
    /// An absent field becomes an array of one element.
    pub fn add_to_field(&mut self, name: &str, value: impl IntoFieldValue) -> Result<(), DocumentError> {
        Self::check_writable(name)?;
        let value = value.into_field_value();
        match self.fields.get_mut(name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(name.to_string(), Value::Array(vec![value]));
            }
        }
        Ok(())
    }

    /// Sets the field if absent, otherwise adds to it.
    pub fn set_or_add(&mut self, name: &str, value: impl IntoFieldValue) -> Result<(), DocumentError> {
        if self.fields.contains_key(name) {
            self.add_to_field(name, value)
        } else {
            self.set_field(name, value)
        }
    }

    /// Writes several values to a field according to `mode`.
    pub fn update<V, I>(&mut self, name: &str, mode: UpdateMode, values: I) -> Result<(), DocumentError>
    where
        V: IntoFieldValue,
        I: IntoIterator<Item = V>,
    {
        Self::check_writable(name)?;
        let exists = self.fields.contains_key(name);
        if mode == UpdateMode::Skip && exists {
            return Ok(());
        }
        let mut values = values.into_iter();
        if mode != UpdateMode::Append || !exists {
            match values.next() {
                Some(first) => self.set_field(name, first)?,
                None => return Ok(()),
            }
        }
        for value in values {
            self.add_to_field(name, value)?;
        }
        Ok(())
    }

    /// Removes a field, returning its stored value.
    pub fn remove_field(&mut self, name: &str) -> Result<Option<Value>, DocumentError> {
        Self::check_writable(name)?;
        Ok(self.fields.shift_remove(name))
    }

    /// Removes one element of a multi-valued field.
    pub fn remove_from_array(&mut self, name: &str, index: usize) -> Result<Option<Value>, DocumentError> {
        Self::check_writable(name)?;
        Ok(match self.fields.get_mut(name) {
            Some(Value::Array(items)) if index < items.len() => Some(items.remove(index)),
            _ => None,
        })
    }

    /// Moves the values of `old` into `new` using `mode`. A missing `old` is a
    /// no-op.
    pub fn rename_field(&mut self, old: &str, new: &str, mode: UpdateMode) -> Result<(), DocumentError> {
        Self::check_writable(old)?;
        Self::check_writable(new)?;
        let Some(stored) = self.fields.shift_remove(old) else {
            return Ok(());
        };
        match stored {
            Value::Array(items) if items.is_empty() => {
                if mode != UpdateMode::Skip || !self.fields.contains_key(new) {
                    self.fields.insert(new.to_string(), Value::Array(items));
                }
                Ok(())
            }
            Value::Array(items) => self.update(new, mode, items),
            single => self.update(new, mode, [single]),
        }
    }

    /// Copies every user field of `other` into this document with
    /// [`Document::set_or_add`] semantics.
    pub fn set_or_add_all(&mut self, other: &Self) -> Result<(), DocumentError> {
        for name in other.field_names() {
            match other.fields.get(name) {
                Some(Value::Array(items)) => {
                    for item in items {
                        self.set_or_add(name, item)?;
                    }
                }
                Some(single) => self.set_or_add(name, single)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Removes repeated values from a multi-valued field, keeping first
    /// occurrences in order.
    pub fn remove_duplicate_values(&mut self, name: &str) -> Result<(), DocumentError> {
        Self::check_writable(name)?;
        if let Some(Value::Array(items)) = self.fields.get_mut(name) {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            *items = unique;
        }
        Ok(())
    }

    // ---- typed reads ----

    fn first_as<T>(&self, name: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        match self.lookup(name)?.as_ref() {
            Value::Array(items) => items.first().and_then(convert),
            single => convert(single),
        }
    }

    fn all_as<T>(&self, name: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
        match self.lookup(name)?.as_ref() {
            Value::Array(items) => Some(items.iter().filter_map(convert).collect()),
            single => Some(convert(single).into_iter().collect()),
        }
    }

    /// Returns the stored value of a field, single or array.
    pub fn get_json(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the first value of a field as a string.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.first_as(name, value::as_string)
    }

    /// Returns all values of a field as strings.
    pub fn get_string_list(&self, name: &str) -> Option<Vec<String>> {
        self.all_as(name, value::as_string)
    }

    /// Returns the first value of a field as an `i32`.
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.first_as(name, value::as_int)
    }

    /// Returns all values of a field as `i32`s.
    pub fn get_int_list(&self, name: &str) -> Option<Vec<i32>> {
        self.all_as(name, value::as_int)
    }

    /// Returns the first value of a field as an `i64`.
    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.first_as(name, value::as_long)
    }

    /// Returns all values of a field as `i64`s.
    pub fn get_long_list(&self, name: &str) -> Option<Vec<i64>> {
        self.all_as(name, value::as_long)
    }

    /// Returns the first value of a field as an `f64`.
    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.first_as(name, value::as_double)
    }

    /// Returns all values of a field as `f64`s.
    pub fn get_double_list(&self, name: &str) -> Option<Vec<f64>> {
        self.all_as(name, value::as_double)
    }

    /// Returns the first value of a field as a boolean.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.first_as(name, value::as_bool)
    }

    /// Returns all values of a field as booleans.
    pub fn get_bool_list(&self, name: &str) -> Option<Vec<bool>> {
        self.all_as(name, value::as_bool)
    }

    /// Returns the first value of a field as an instant.
    pub fn get_instant(&self, name: &str) -> Option<Timestamp> {
        self.first_as(name, value::as_instant)
    }

    /// Returns all values of a field as instants.
    pub fn get_instant_list(&self, name: &str) -> Option<Vec<Timestamp>> {
        self.all_as(name, value::as_instant)
    }

    /// Returns the first value of a field decoded as bytes.
    pub fn get_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.first_as(name, value::as_bytes)
    }

    /// Returns all values of a field decoded as bytes.
    pub fn get_bytes_list(&self, name: &str) -> Option<Vec<Vec<u8>>> {
        self.all_as(name, value::as_bytes)
    }

    // ---- nested paths ----

    fn split_field(path: &[Segment]) -> Result<(&str, &[Segment]), DocumentError> {
        match path.split_first() {
            Some((Segment::Key(field), rest)) => Ok((field.as_str(), rest)),
            _ => Err(DocumentError::invalid_path(
                &Segment::stringify(path),
                "path must start with a field name",
            )),
        }
    }

    /// Reads the value at a nested path. Missing paths yield `None`.
    pub fn get_nested_json(&self, path: &[Segment]) -> Option<&Value> {
        let (field, rest) = Self::split_field(path).ok()?;
        path::get_in(self.fields.get(field)?, rest)
    }

    /// Writes a value at a nested path, creating intermediate containers.
    ///
    /// On error the document is left unchanged.
    pub fn set_nested_json(&mut self, path: &[Segment], value: impl IntoFieldValue) -> Result<(), DocumentError> {
        let (field, rest) = Self::split_field(path)?;
        Self::check_writable(field)?;
        let mut target = self.fields.get(field).cloned().unwrap_or(Value::Null);
        path::set_in(&mut target, rest, value.into_field_value())?;
        self.fields.insert(field.to_string(), target);
        Ok(())
    }

    /// Removes the value at a nested path. Missing paths are a no-op.
    pub fn remove_nested_json(&mut self, path: &[Segment]) -> Result<Option<Value>, DocumentError> {
        let (field, rest) = Self::split_field(path)?;
        Self::check_writable(field)?;
        if rest.is_empty() {
            return Ok(self.fields.shift_remove(field));
        }
        Ok(self
            .fields
            .get_mut(field)
            .and_then(|target| path::remove_in(target, rest)))
    }

    // ---- errors ----

    /// Records a processing error on the document.
    pub fn log_error(&mut self, message: impl Into<String>) {
        let message = Value::String(message.into());
        match self.fields.get_mut(ERRORS_FIELD) {
            Some(Value::Array(items)) => items.push(message),
            _ => {
                self.fields
                    .insert(ERRORS_FIELD.to_string(), Value::Array(vec![message]));
            }
        }
    }

    /// Returns the recorded processing errors.
    pub fn errors(&self) -> Vec<String> {
        self.get_string_list(ERRORS_FIELD).unwrap_or_default()
    }

    // ---- children ----

    /// Attaches a child document, taking ownership of it.
    pub fn add_child(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Returns copies of the attached children.
    pub fn children(&self) -> Vec<Self> {
        self.children.clone()
    }

    /// Whether any children are attached.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Detaches and returns all children.
    pub fn remove_children(&mut self) -> Vec<Self> {
        std::mem::take(&mut self.children)
    }

    // ---- drop flag ----

    /// Whether a stage marked this document as dropped.
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Marks or unmarks the document as dropped.
    pub fn set_dropped(&mut self, dropped: bool) {
        self.dropped = dropped;
    }

    // ---- wire form ----

    /// Builds the wire form of the document.
    pub fn to_json(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + 4);
        out.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        if let Some(run_id) = &self.run_id {
            out.insert(RUN_ID_FIELD.to_string(), Value::String(run_id.clone()));
        }
        for (name, value) in &self.fields {
            out.insert(name.clone(), value.clone());
        }
        if !self.children.is_empty() {
            out.insert(
                CHILDREN_FIELD.to_string(),
                Value::Array(self.children.iter().map(Self::to_json).collect()),
            );
        }
        if self.dropped {
            out.insert(DROPPED_FIELD.to_string(), Value::Bool(true));
        }
        Value::Object(out)
    }

    /// Parses a document from its wire form.
    pub fn from_json(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(map) = value else {
            return Err(DocumentError::Malformed("expected a JSON object".to_string()));
        };
        let mut id = None;
        let mut doc_fields = Map::new();
        let mut run_id = None;
        let mut children = Vec::new();
        let mut dropped = false;

        for (name, value) in map {
            match name.as_str() {
                ID_FIELD => match value {
                    Value::String(s) => id = Some(s),
                    _ => return Err(DocumentError::Malformed("'id' must be a string".to_string())),
                },
                RUN_ID_FIELD => match value {
                    Value::String(s) => run_id = Some(s),
                    Value::Null => {}
                    _ => {
                        return Err(DocumentError::Malformed("'runId' must be a string".to_string()));
                    }
                },
                CHILDREN_FIELD => match value {
                    Value::Array(items) => {
                        children = items
                            .into_iter()
                            .map(Self::from_json)
                            .collect::<Result<_, _>>()?;
                    }
                    _ => {
                        return Err(DocumentError::Malformed(
                            "'children' must be an array".to_string(),
                        ));
                    }
                },
                DROPPED_FIELD => dropped = value.as_bool().unwrap_or(false),
                _ => {
                    doc_fields.insert(name, value);
                }
            }
        }

        let mut doc = Self::new(id.ok_or_else(|| DocumentError::Malformed("missing 'id'".to_string()))?)?;
        doc.run_id = run_id;
        doc.fields = doc_fields;
        doc.children = children;
        doc.dropped = dropped;
        Ok(doc)
    }

    /// Serializes the wire form to a compact JSON string.
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Parses a document from a JSON string.
    pub fn from_json_str(input: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        Self::from_json(value)
    }

    /// Parses a document from raw message bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        Self::from_json(value)
    }

    /// Serializes the wire form to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json_string().into_bytes()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(D::Error::custom)
    }
}
