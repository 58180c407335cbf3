//! Template references in node params.
//!
//! A reference is `$` followed by a path of identifier segments separated by
//! dots, each optionally followed by `[index]` segments: `$name`,
//! `$user.address.city`, `$items[0].title`. The braced form `${path}`
//! delimits the path explicitly.
//!
//! The bare form is matched greedily: in `"$file.txt"` the reference is
//! `file.txt`, i.e. the field `txt` of `file`, never `$file` followed by the
//! literal text `.txt`. Write `"${file}.txt"` when the dot is literal.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use wfcore::value::{to_text, type_name};
use wfcore::{ResolutionError, Value, ValueStore};

const PATH: &str = r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*|\[[0-9]+\])*";

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\$(?:\{{(?P<braced>{PATH})\}}|(?P<bare>{PATH}))"))
        .expect("reference pattern is valid")
});

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<key>[A-Za-z_][A-Za-z0-9_]*)|\[(?P<index>[0-9]+)\]")
        .expect("segment pattern is valid")
});

/// One step of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed reference found in a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The reference as written, sigil and braces included
    pub raw: String,
    pub segments: Vec<Segment>,
}

impl Reference {
    fn parse(raw: &str, path: &str) -> Self {
        let segments = SEGMENT
            .captures_iter(path)
            .map(|caps| match caps.name("key") {
                Some(key) => Segment::Key(key.as_str().to_string()),
                // Digits only; an index too large for usize can never be in range.
                None => Segment::Index(caps["index"].parse().unwrap_or(usize::MAX)),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Top-level store key the reference starts from
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Key(key)) => key,
            _ => "",
        }
    }

    /// Walk the path through the store, left to right.
    pub fn lookup<'a>(&self, store: &'a ValueStore) -> Result<&'a Value, ResolutionError> {
        let root = self.root();
        let mut current = store
            .get(root)
            .ok_or_else(|| ResolutionError::MissingKey {
                reference: self.raw.clone(),
                segment: root.to_string(),
            })?;

        for segment in self.segments.iter().skip(1) {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.get(key).ok_or_else(|| ResolutionError::MissingKey {
                        reference: self.raw.clone(),
                        segment: key.clone(),
                    })?
                }
                (Segment::Index(index), Value::Array(items)) => {
                    items
                        .get(*index)
                        .ok_or_else(|| ResolutionError::IndexOutOfRange {
                            reference: self.raw.clone(),
                            index: *index,
                            len: items.len(),
                        })?
                }
                (segment, other) => {
                    return Err(ResolutionError::NotTraversable {
                        reference: self.raw.clone(),
                        segment: segment.to_string(),
                        found: type_name(other),
                    })
                }
            };
        }
        Ok(current)
    }
}

fn captures_to_reference(caps: &regex::Captures<'_>) -> Reference {
    let path = caps
        .name("braced")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    Reference::parse(&caps[0], path)
}

/// Whether a string contains at least one reference
pub fn has_references(text: &str) -> bool {
    REFERENCE.is_match(text)
}

/// Every reference in a string, in order of appearance
pub fn parse_references(text: &str) -> Vec<Reference> {
    REFERENCE
        .captures_iter(text)
        .map(|caps| captures_to_reference(&caps))
        .collect()
}

/// Every reference anywhere inside a value, walking objects and arrays
pub fn collect_references(value: &Value) -> Vec<Reference> {
    let mut found = Vec::new();
    collect_into(value, &mut found);
    found
}

fn collect_into(value: &Value, found: &mut Vec<Reference>) {
    match value {
        Value::String(text) => found.extend(parse_references(text)),
        Value::Array(items) => items.iter().for_each(|item| collect_into(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_into(item, found)),
        _ => {}
    }
}

/// Resolve a string. A string that is exactly one reference keeps the
/// referenced value's type; otherwise each reference is rendered as text and
/// substituted in place.
pub fn resolve_str(text: &str, store: &ValueStore) -> Result<Value, ResolutionError> {
    if let Some(caps) = REFERENCE.captures(text) {
        let whole = &caps[0];
        if whole.len() == text.len() {
            return captures_to_reference(&caps).lookup(store).cloned();
        }
    } else {
        return Ok(Value::String(text.to_string()));
    }

    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;
    for caps in REFERENCE.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        rendered.push_str(&text[last..m.start()]);
        let value = captures_to_reference(&caps).lookup(store)?;
        rendered.push_str(&to_text(value));
        last = m.end();
    }
    rendered.push_str(&text[last..]);
    Ok(Value::String(rendered))
}

/// Resolve every string inside a value, recursively
pub fn resolve_value(value: &Value, store: &ValueStore) -> Result<Value, ResolutionError> {
    match value {
        Value::String(text) => resolve_str(text, store),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, store))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, store)?)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolve a node's params, passing the `verbatim` ones through untouched.
///
/// Keys are visited in sorted order, so the first failing reference is the
/// same on every run.
pub fn resolve_params(
    params: &HashMap<String, Value>,
    store: &ValueStore,
    verbatim: &[String],
) -> Result<HashMap<String, Value>, ResolutionError> {
    let mut entries: Vec<(&String, &Value)> = params.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(key, value)| {
            if verbatim.iter().any(|v| v == key) {
                Ok((key.clone(), value.clone()))
            } else {
                Ok((key.clone(), resolve_value(value, store)?))
            }
        })
        .collect()
}
