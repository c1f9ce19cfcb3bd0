//! Class-name dictionary compression.
//!
//! Names and method signatures are written as a sequence of segments. Each
//! segment starts with a varint tag `(value << 2) | kind`:
//!
//! | kind | value         | expands to                                   |
//! |------|---------------|----------------------------------------------|
//! | 0    | byte length   | the literal bytes that follow                |
//! | 1    | class id      | the dotted name of an earlier class          |
//! | 2    | class id      | `L` + slash-separated name of that class + `;` |
//!
//! Inner classes reference their outer class (`a.Foo$1` → `[1:a.Foo] "$1"`)
//! and descriptors reference parameter classes (`(La/Foo;)V`).

use super::varint::{read_bytes, read_len, read_varint, write_varint};
use crate::result::{CovError, CovResult};
use std::collections::HashMap;
use std::io::{self, Read, Write};

const KIND_LITERAL: u64 = 0;
const KIND_CLASS: u64 = 1;
const KIND_DESCRIPTOR: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Class(u32),
    Descriptor(u32),
}

/// Class names seen so far in one stream, by id
#[derive(Debug, Default)]
pub struct ClassDictionary {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl ClassDictionary {
    /// Create an empty dictionary
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered names
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name registered under `id`
    #[must_use]
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Id of `name`, if registered
    #[must_use]
    pub fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    fn register(&mut self, name: String) -> u32 {
        let id = self.names.len() as u32;
        let _ = self.ids.entry(name.clone()).or_insert(id);
        self.names.push(name);
        id
    }

    /// Write a class name and register it under the next id
    pub fn write_class_name<W: Write + ?Sized>(&mut self, w: &mut W, name: &str) -> io::Result<u32> {
        let segments = self.class_name_segments(name);
        write_segments(w, &segments)?;
        Ok(self.register(name.to_string()))
    }

    /// Read a class name and register it under the next id
    pub fn read_class_name<R: Read + ?Sized>(&mut self, r: &mut R) -> CovResult<(u32, String)> {
        let name = self.read_text(r)?;
        Ok((self.register(name.clone()), name))
    }

    /// Write free text (a method signature or test tag), referencing known classes
    pub fn write_text<W: Write + ?Sized>(&self, w: &mut W, text: &str) -> io::Result<()> {
        let segments = self.text_segments(text);
        write_segments(w, &segments)
    }

    /// Read text written by [`Self::write_text`] or [`Self::write_class_name`]
    pub fn read_text<R: Read + ?Sized>(&self, r: &mut R) -> CovResult<String> {
        let count = read_len(r, "segment count")?;
        let mut out = String::new();
        for _ in 0..count {
            let tag = read_varint(r, "segment tag")?;
            let value = tag >> 2;
            match tag & 0b11 {
                KIND_LITERAL => {
                    let len = usize::try_from(value)
                        .map_err(|_| CovError::format("literal segment too long"))?;
                    let bytes = read_bytes(r, len, "literal segment")?;
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|_| CovError::format("invalid UTF-8 in literal segment"))?;
                    out.push_str(text);
                }
                KIND_CLASS => out.push_str(self.referenced(value)?),
                KIND_DESCRIPTOR => {
                    out.push('L');
                    out.push_str(&self.referenced(value)?.replace('.', "/"));
                    out.push(';');
                }
                kind => return Err(CovError::format(format!("unknown segment kind {kind}"))),
            }
        }
        Ok(out)
    }

    fn referenced(&self, value: u64) -> CovResult<&str> {
        u32::try_from(value)
            .ok()
            .and_then(|id| self.name(id))
            .ok_or_else(|| CovError::format(format!("reference to unknown class id {value}")))
    }

    fn class_name_segments<'a>(&self, name: &'a str) -> Vec<Segment<'a>> {
        let outer = name
            .char_indices()
            .rev()
            .filter(|&(_, c)| c == '$')
            .find_map(|(pos, _)| self.id(&name[..pos]).map(|id| (pos, id)));
        match outer {
            Some((pos, id)) => vec![Segment::Class(id), Segment::Literal(&name[pos..])],
            None => vec![Segment::Literal(name)],
        }
    }

    fn text_segments<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let Some(open) = text.find('(') else {
            return vec![Segment::Literal(text)];
        };
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut pos = open;
        while let Some(offset) = text[pos..].find('L') {
            let start = pos + offset;
            let Some(len) = text[start..].find(';') else {
                break;
            };
            let end = start + len;
            let internal = &text[start + 1..end];
            let id = if internal.contains('.') {
                None
            } else {
                self.id(&internal.replace('/', "."))
            };
            if let Some(id) = id {
                push_literal(&mut segments, &text[literal_start..start]);
                segments.push(Segment::Descriptor(id));
                literal_start = end + 1;
            }
            pos = end + 1;
        }
        push_literal(&mut segments, &text[literal_start..]);
        segments
    }
}

fn push_literal<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Literal(text));
    }
}

fn write_segments<W: Write + ?Sized>(w: &mut W, segments: &[Segment<'_>]) -> io::Result<()> {
    let segments: Vec<&Segment<'_>> = segments
        .iter()
        .filter(|s| !matches!(s, Segment::Literal("")))
        .collect();
    write_varint(w, segments.len() as u64)?;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                write_varint(w, ((text.len() as u64) << 2) | KIND_LITERAL)?;
                w.write_all(text.as_bytes())?;
            }
            Segment::Class(id) => write_varint(w, (u64::from(*id) << 2) | KIND_CLASS)?,
            Segment::Descriptor(id) => write_varint(w, (u64::from(*id) << 2) | KIND_DESCRIPTOR)?,
        }
    }
    Ok(())
}
