//! Nested paths into tree-valued fields.
//!
//! A path such as `a.b.c[5].d[4][6]` is a sequence of [`Segment`]s: object
//! keys separated by dots and array indices in brackets. The parser is
//! lenient about dots (leading, trailing and repeated dots are ignored, a dot
//! after `]` may be omitted, a dot before `[` is ignored) and strict about
//! everything else.

use std::fmt;

use serde_json::{Map, Value};

use crate::errors::DocumentError;

/// One step of a nested path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

impl Segment {
    /// Parses a path string into segments.
    ///
    /// ```
    /// use docflow::document::Segment;
    ///
    /// let path = Segment::parse("a.b[2].c").unwrap();
    /// assert_eq!(path.len(), 4);
    /// assert_eq!(Segment::stringify(&path), "a.b[2].c");
    /// ```
    pub fn parse(path: &str) -> Result<Vec<Self>, DocumentError> {
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = path.chars();

        while let Some(c) = chars.next() {
            match c {
                c if c.is_whitespace() => {
                    return Err(DocumentError::invalid_path(path, "whitespace is not allowed"));
                }
                '.' => flush_key(&mut key, &mut segments),
                '[' => {
                    flush_key(&mut key, &mut segments);
                    if segments.is_empty() {
                        return Err(DocumentError::invalid_path(path, "path must start with a key"));
                    }
                    segments.push(Self::Index(parse_index(path, &mut chars)?));
                }
                ']' => return Err(DocumentError::invalid_path(path, "unbalanced ']'")),
                c => key.push(c),
            }
        }
        flush_key(&mut key, &mut segments);

        if segments.is_empty() {
            return Err(DocumentError::invalid_path(path, "path is empty"));
        }
        Ok(segments)
    }

    /// Renders segments back into canonical path syntax.
    pub fn stringify(segments: &[Self]) -> String {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Self::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                Self::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

fn flush_key(key: &mut String, segments: &mut Vec<Segment>) {
    if !key.is_empty() {
        segments.push(Segment::Key(std::mem::take(key)));
    }
}

fn parse_index(path: &str, chars: &mut std::str::Chars<'_>) -> Result<usize, DocumentError> {
    let mut digits = String::new();
    loop {
        match chars.next() {
            Some(']') => break,
            Some('[') => {
                return Err(DocumentError::invalid_path(path, "nested '[' is not allowed"));
            }
            Some(c) if c.is_ascii_digit() => digits.push(c),
            Some(c) => {
                return Err(DocumentError::invalid_path(
                    path,
                    format!("'{c}' is not a valid index character"),
                ));
            }
            None => return Err(DocumentError::invalid_path(path, "unbalanced '['")),
        }
    }
    if digits.is_empty() {
        return Err(DocumentError::invalid_path(path, "empty index"));
    }
    digits
        .parse()
        .map_err(|_| DocumentError::invalid_path(path, format!("index '{digits}' is too large")))
}

fn empty_container(next: &Segment) -> Value {
    match next {
        Segment::Key(_) => Value::Object(Map::new()),
        Segment::Index(_) => Value::Array(Vec::new()),
    }
}

/// Reads the value at `segments` below `node`.
pub(crate) fn get_in<'a>(node: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(node, |current, segment| match segment {
        Segment::Key(key) => current.get(key.as_str()),
        Segment::Index(index) => current.get(*index),
    })
}

/// Writes `value` at `segments` below `node`, creating intermediate
/// containers. Null nodes are replaced by the container the next segment
/// needs.
pub(crate) fn set_in(node: &mut Value, segments: &[Segment], value: Value) -> Result<(), DocumentError> {
    let Some((head, tail)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };
    if node.is_null() {
        *node = empty_container(head);
    }
    let child = match (head, node) {
        (Segment::Key(key), Value::Object(map)) => map.entry(key.clone()).or_insert(Value::Null),
        (Segment::Index(index), Value::Array(items)) => {
            let len = items.len();
            if *index > len {
                return Err(DocumentError::IndexOutOfBounds { index: *index, len });
            }
            if *index == len {
                items.push(Value::Null);
            }
            &mut items[*index]
        }
        (segment, _) => return Err(DocumentError::NotAContainer(segment.to_string())),
    };
    set_in(child, tail, value)
}

/// Removes the value at `segments` below `node`. Missing paths are a no-op.
pub(crate) fn remove_in(node: &mut Value, segments: &[Segment]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut parent = node;
    for segment in parents {
        parent = match segment {
            Segment::Key(key) => parent.get_mut(key.as_str())?,
            Segment::Index(index) => parent.get_mut(*index)?,
        };
    }
    match last {
        Segment::Key(key) => parent.as_object_mut()?.shift_remove(key.as_str()),
        Segment::Index(index) => {
            let items = parent.as_array_mut()?;
            (*index < items.len()).then(|| items.remove(*index))
        }
    }
}
