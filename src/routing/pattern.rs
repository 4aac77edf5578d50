//! Path template compilation.
//!
//! A template such as `/products/{id}` or `/files/{name}.{ext}` compiles to a
//! list of segments, each a sequence of literal text and placeholders. A path
//! matches when it has the same number of `/`-separated segments and every
//! segment matches its counterpart:
//!
//! - literal text compares case-insensitively,
//! - a placeholder captures a non-empty run of characters (never a `/`),
//!   greedily, backtracking when later text in the segment fails.
//!
//! Request paths are matched segment by segment after percent-decoding each
//! segment on its own, so an encoded `%2F` can appear inside a captured value
//! without changing the segment count.

use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("unclosed placeholder in template {template:?}")]
    UnclosedPlaceholder { template: String },
    #[error("unmatched '}}' in template {template:?}")]
    UnmatchedBrace { template: String },
    #[error("empty placeholder name in template {template:?}")]
    EmptyPlaceholder { template: String },
    #[error("placeholder {name:?} appears more than once in template {template:?}")]
    DuplicateParameter { template: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    /// Index into the pattern's parameter names.
    Param(usize),
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    segments: Vec<Vec<Part>>,
    params: Vec<String>,
}

impl RoutePattern {
    /// Compiles `template`. An empty template is the root path `/`.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let body = template.strip_prefix('/').unwrap_or(template);
        let mut params: Vec<String> = Vec::new();
        let mut segments = Vec::new();

        for raw in body.split('/') {
            segments.push(compile_segment(template, raw, &mut params)?);
        }

        Ok(Self {
            template: template.to_string(),
            segments,
            params,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn is_match(&self, raw_path: &str) -> bool {
        self.match_path(raw_path).is_some()
    }

    /// Matches a raw request path, returning decoded captures in template
    /// order.
    pub fn match_path(&self, raw_path: &str) -> Option<Vec<(String, String)>> {
        let body = raw_path.strip_prefix('/').unwrap_or(raw_path);
        let raw_segments: Vec<&str> = body.split('/').collect();
        if raw_segments.len() != self.segments.len() {
            return None;
        }

        let mut captures: Vec<Option<String>> = vec![None; self.params.len()];
        for (parts, raw) in self.segments.iter().zip(raw_segments) {
            let decoded = decode_segment(raw);
            if !match_parts(parts, &decoded, &mut captures) {
                return None;
            }
        }

        self.params
            .iter()
            .cloned()
            .zip(captures)
            .map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn compile_segment(
    template: &str,
    raw: &str,
    params: &mut Vec<String>,
) -> Result<Vec<Part>, PatternError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => break,
                        _ => name.push(c),
                    }
                }
                if !closed {
                    return Err(PatternError::UnclosedPlaceholder {
                        template: template.to_string(),
                    });
                }
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(PatternError::EmptyPlaceholder {
                        template: template.to_string(),
                    });
                }
                if params.contains(&name) {
                    return Err(PatternError::DuplicateParameter {
                        template: template.to_string(),
                        name,
                    });
                }
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Param(params.len()));
                params.push(name);
            }
            '}' => {
                return Err(PatternError::UnmatchedBrace {
                    template: template.to_string(),
                });
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

fn decode_segment(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

fn match_parts(parts: &[Part], input: &str, captures: &mut [Option<String>]) -> bool {
    match parts.split_first() {
        None => input.is_empty(),
        Some((Part::Literal(literal), rest)) => match strip_prefix_ignore_case(input, literal) {
            Some(remaining) => match_parts(rest, remaining, captures),
            None => false,
        },
        Some((Part::Param(index), rest)) => {
            // Candidate end offsets, longest first; a capture is never empty.
            let ends = input
                .char_indices()
                .skip(1)
                .map(|(i, _)| i)
                .chain((!input.is_empty()).then_some(input.len()));
            let ends: Vec<usize> = ends.collect();

            for end in ends.into_iter().rev() {
                if match_parts(rest, &input[end..], captures) {
                    captures[*index] = Some(input[..end].to_string());
                    return true;
                }
            }
            false
        }
    }
}

fn strip_prefix_ignore_case<'a>(input: &'a str, literal: &str) -> Option<&'a str> {
    let mut chars = input.char_indices();
    for expected in literal.chars() {
        let (_, actual) = chars.next()?;
        if expected != actual && !expected.to_lowercase().eq(actual.to_lowercase()) {
            return None;
        }
    }
    let offset = chars.next().map(|(i, _)| i).unwrap_or(input.len());
    Some(&input[offset..])
}
