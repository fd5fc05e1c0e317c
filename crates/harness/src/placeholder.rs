// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Placeholder resolution for query templates
//!
//! A placeholder is `::` immediately followed by an identifier
//! (`[A-Za-z_][A-Za-z0-9_]*`), e.g. `USE ::dbName`. Values are substituted
//! literally and are not escaped.

use std::collections::BTreeMap;

use crate::error::PlaceholderError;

/// Placeholder prefix
pub const PREFIX: &str = "::";

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Whether `name` can be referenced as `::name`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

/// A template split into literal text and placeholder names
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = template[pos..].find(PREFIX) {
        let marker = pos + offset;
        let name_start = marker + PREFIX.len();
        let rest = &template[name_start..];

        match rest.chars().next() {
            Some(ch) if is_ident_start(ch) => {
                let len = rest
                    .char_indices()
                    .find(|(_, c)| !is_ident_char(*c))
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());

                if marker > literal_start {
                    out.push(Segment::Literal(&template[literal_start..marker]));
                }
                out.push(Segment::Placeholder(&rest[..len]));
                pos = name_start + len;
                literal_start = pos;
            }
            // `::` without an identifier stays literal; skip one colon so
            // `:::name` still finds the placeholder.
            _ => pos = marker + 1,
        }
    }

    if literal_start < template.len() {
        out.push(Segment::Literal(&template[literal_start..]));
    }
    out
}

/// List placeholder names in order of appearance (duplicates included)
pub fn placeholders(template: &str) -> Vec<&str> {
    segments(template)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Substitute every placeholder in `template` from `params`
///
/// Fails with [`PlaceholderError::MissingParameter`] naming the first
/// placeholder without a value. Unused params are ignored.
pub fn resolve(
    template: &str,
    params: Option<&BTreeMap<String, String>>,
) -> Result<String, PlaceholderError> {
    let mut resolved = String::with_capacity(template.len());

    for segment in segments(template) {
        match segment {
            Segment::Literal(text) => resolved.push_str(text),
            Segment::Placeholder(name) => {
                let value = params
                    .and_then(|p| p.get(name))
                    .ok_or_else(|| PlaceholderError::MissingParameter(name.to_string()))?;
                resolved.push_str(value);
            }
        }
    }

    Ok(resolved)
}
