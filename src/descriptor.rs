//! Parsed program interface descriptors.
//!
//! An [`InterfaceDescriptor`] describes the queries, mutations and event
//! shapes a deployed program exposes. It is parsed once per program kind
//! (see [`InterfaceDescriptor::parse`]) and shared read-only across every
//! binding of that kind.

use std::collections::HashMap;

use alloy::primitives::{B256, keccak256};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{codec::CodecError, error::Error};

/// What an interface entry can be invoked as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Read-only invocation, no observable side effects.
    Query,
    /// State-changing invocation, broadcast and settled by the ledger.
    Mutate,
    /// Structured record the program emits at a ledger position.
    Event,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntryKind::Query => "query",
            EntryKind::Mutate => "mutate",
            EntryKind::Event => "event",
        })
    }
}

/// Shape of a single parameter, return value or event field.
///
/// The `type_tag` is opaque to this layer; it is only meaningful to the
/// codec collaborator and to the signature string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamShape {
    name: String,
    type_tag: String,
    indexed: bool,
}

impl ParamShape {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            type_tag: type_tag.into(),
            indexed: false,
        }
    }

    pub fn named(type_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            indexed: false,
        }
    }

    /// Marks the field as indexed. Only valid on event fields.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
}

/// One named entry of a program interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    name: String,
    kind: EntryKind,
    inputs: Vec<ParamShape>,
    outputs: Vec<ParamShape>,
}

impl Entry {
    pub fn query(
        name: impl Into<String>,
        inputs: Vec<ParamShape>,
        outputs: Vec<ParamShape>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Query,
            inputs,
            outputs,
        }
    }

    pub fn mutation(name: impl Into<String>, inputs: Vec<ParamShape>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Mutate,
            inputs,
            outputs: Vec::new(),
        }
    }

    pub fn event(name: impl Into<String>, fields: Vec<ParamShape>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Event,
            inputs: fields,
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn inputs(&self) -> &[ParamShape] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ParamShape] {
        &self.outputs
    }

    /// Number of indexed fields. Zero for non-event entries.
    pub fn indexed_count(&self) -> usize {
        self.inputs.iter().filter(|p| p.indexed).count()
    }

    /// Human-readable signature, e.g. `Transfer(address,uint64)`.
    pub fn signature(&self) -> String {
        format!(
            "{}({})",
            self.name,
            self.inputs.iter().map(|p| p.type_tag.as_str()).join(",")
        )
    }

    /// Event selector the transport filters logs by: the keccak digest of
    /// the signature.
    pub fn selector(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }
}

/// Immutable description of a program's callable and emittable shapes.
///
/// Persisting descriptors is the caller's concern: entries serialize, and a
/// descriptor is rebuilt (re-validated) from them via
/// [`InterfaceDescriptor::new`].
#[derive(Clone, Debug)]
pub struct InterfaceDescriptor {
    name: String,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl InterfaceDescriptor {
    /// Builds a descriptor from entries, validating them statically.
    pub fn new(name: impl Into<String>, entries: Vec<Entry>) -> Result<Self, Error> {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if entry.name.is_empty() {
                return Err(Error::Binding("entry with an empty name".to_string()));
            }
            if entry.inputs.iter().any(|p| p.type_tag.is_empty()) {
                return Err(Error::Binding(format!(
                    "`{}` has a parameter with an empty type tag",
                    entry.name
                )));
            }
            if entry.kind != EntryKind::Event && entry.indexed_count() > 0 {
                return Err(Error::Binding(format!(
                    "`{}` is a {} entry and cannot have indexed parameters",
                    entry.name, entry.kind
                )));
            }
            if entry.kind == EntryKind::Event && !entry.outputs.is_empty() {
                return Err(Error::Binding(format!(
                    "event `{}` cannot declare return values",
                    entry.name
                )));
            }
            if index.insert(entry.name.clone(), pos).is_some() {
                return Err(Error::Binding(format!("duplicate entry `{}`", entry.name)));
            }
        }
        Ok(Self {
            name: name.into(),
            entries,
            index,
        })
    }

    /// Parses a line-oriented interface text. Format:
    ///
    /// ```text
    /// program CollateralVault
    /// query lockedOf(address owner) -> (uint64)
    /// mutate lock(address owner, uint64 amount)
    /// event CollateralLocked(address indexed owner, uint64 amount)
    /// ```
    ///
    /// Blank lines and `#` comments are ignored. Fails with
    /// [`Error::Binding`] on malformed text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut name = String::new();
        let mut entries = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("program ") {
                name = rest.trim().to_string();
                continue;
            }
            entries.push(
                parse_entry(line)
                    .map_err(|msg| Error::Binding(format!("line {}: {msg}", lineno + 1)))?,
            );
        }
        Self::new(name, entries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|pos| &self.entries[*pos])
    }

    /// Looks up `name` and checks it is a query entry.
    pub fn query(&self, name: &str) -> Result<&Entry, Error> {
        self.of_kind(name, EntryKind::Query)
    }

    /// Looks up `name` and checks it is a mutate entry.
    pub fn mutation(&self, name: &str) -> Result<&Entry, Error> {
        self.of_kind(name, EntryKind::Mutate)
    }

    /// Looks up `name` and checks it is an event entry.
    pub fn event(&self, name: &str) -> Result<&Entry, Error> {
        self.of_kind(name, EntryKind::Event)
    }

    fn of_kind(&self, name: &str, kind: EntryKind) -> Result<&Entry, Error> {
        match self.entry(name) {
            Some(entry) if entry.kind == kind => Ok(entry),
            Some(entry) => Err(Error::Encoding(CodecError::new(format!(
                "`{name}` is a {} entry, not a {kind}",
                entry.kind
            )))),
            None => Err(Error::Encoding(CodecError::new(format!(
                "interface has no entry `{name}`"
            )))),
        }
    }
}

fn parse_entry(line: &str) -> Result<Entry, String> {
    let (keyword, rest) = line
        .split_once(' ')
        .ok_or("expected `<kind> <signature>`")?;
    let kind = match keyword {
        "query" => EntryKind::Query,
        "mutate" => EntryKind::Mutate,
        "event" => EntryKind::Event,
        other => return Err(format!("unknown entry kind `{other}`")),
    };

    let (head, returns) = match rest.split_once("->") {
        Some((head, ret)) => (head.trim(), Some(ret.trim())),
        None => (rest.trim(), None),
    };
    if kind == EntryKind::Event && returns.is_some() {
        return Err("events cannot declare return values".to_string());
    }

    let open = head.find('(').ok_or("missing parameter list")?;
    if !head.ends_with(')') {
        return Err("unterminated parameter list".to_string());
    }
    let name = head[..open].trim();
    if name.is_empty() {
        return Err("missing entry name".to_string());
    }
    let inputs = parse_params(&head[open + 1..head.len() - 1], kind == EntryKind::Event)?;

    let outputs = match returns {
        Some(ret) => {
            let inner = ret
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or("return list must be parenthesized")?;
            parse_params(inner, false)?
        }
        None => Vec::new(),
    };

    Ok(Entry {
        name: name.to_string(),
        kind,
        inputs,
        outputs,
    })
}

fn parse_params(list: &str, allow_indexed: bool) -> Result<Vec<ParamShape>, String> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|param| {
            let mut tokens = param.split_whitespace();
            let type_tag = tokens.next().ok_or("empty parameter")?.to_string();
            let mut shape = ParamShape::new(type_tag);
            for token in tokens {
                if token == "indexed" {
                    if !allow_indexed {
                        return Err("`indexed` is only valid on event fields".to_string());
                    }
                    shape.indexed = true;
                } else {
                    shape.name = token.to_string();
                }
            }
            Ok(shape)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "\
        # vault interface\n\
        program CollateralVault\n\
        \n\
        query lockedOf(address owner) -> (uint64)\n\
        mutate lock(address owner, uint64 amount)\n\
        event CollateralLocked(address indexed owner, uint64 amount)\n";

    #[test]
    fn parses_interface_text() {
        let descriptor = InterfaceDescriptor::parse(TEXT).unwrap();
        assert_eq!(descriptor.name(), "CollateralVault");
        assert_eq!(descriptor.entries().len(), 3);

        let query = descriptor.query("lockedOf").unwrap();
        assert_eq!(query.inputs().len(), 1);
        assert_eq!(query.inputs()[0].type_tag(), "address");
        assert_eq!(query.inputs()[0].name(), "owner");
        assert_eq!(query.outputs().len(), 1);

        let event = descriptor.event("CollateralLocked").unwrap();
        assert_eq!(event.indexed_count(), 1);
        assert!(event.inputs()[0].is_indexed());
        assert_eq!(event.signature(), "CollateralLocked(address,uint64)");
        assert_eq!(
            event.selector(),
            keccak256("CollateralLocked(address,uint64)".as_bytes())
        );
    }

    #[test]
    fn kind_lookups_are_checked() {
        let descriptor = InterfaceDescriptor::parse(TEXT).unwrap();
        assert!(matches!(
            descriptor.query("lock"),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            descriptor.mutation("missing"),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn rejects_malformed_text() {
        for text in [
            "swap lock(uint64)",                      // unknown kind
            "query lockedOf",                         // no parameter list
            "query lockedOf(uint64",                  // unterminated
            "query (uint64)",                         // no name
            "query lockedOf(uint64 indexed n)",       // indexed outside event
            "event Changed(uint64) -> (uint64)",      // event with returns
            "query dup()\nquery dup()",               // duplicate
        ] {
            assert!(
                matches!(InterfaceDescriptor::parse(text), Err(Error::Binding(_))),
                "expected binding error for {text:?}"
            );
        }
    }

    #[test]
    fn programmatic_construction_is_validated() {
        let err = InterfaceDescriptor::new(
            "Vault",
            vec![Entry::query(
                "bad",
                vec![ParamShape::new("uint64").indexed()],
                vec![],
            )],
        );
        assert!(matches!(err, Err(Error::Binding(_))));
    }
}
