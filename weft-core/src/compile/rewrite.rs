//! Positional text rewriting with a span map.
//!
//! Edits are collected against positions in the original text and applied in
//! one pass, so planners never reason about shifted offsets. Applying also
//! produces a [`SourceMap`] pairing each original span with the span of its
//! replacement in the output, which downstream tooling can serialize with
//! serde.

use serde::{Deserialize, Serialize};

use super::error::CompileError;

#[derive(Debug, Clone)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One original-to-generated span pair. Pure insertions have an empty
/// source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSegment {
    pub src_start: usize,
    pub src_end: usize,
    pub gen_start: usize,
    pub gen_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    pub file: String,
    pub segments: Vec<MapSegment>,
}

impl SourceMap {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Default)]
pub struct Rewriter {
    edits: Vec<Edit>,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Apply all edits to `src`. Edits are sorted by position; any pair of
    /// intersecting spans aborts with [`CompileError::OverlappingEdits`].
    pub fn apply(mut self, src: &str, file: &str) -> Result<(String, SourceMap), CompileError> {
        self.edits.sort_by_key(|e| (e.start, e.end));
        for pair in self.edits.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(CompileError::OverlappingEdits {
                    file: file.to_owned(),
                    first: (pair[0].start, pair[0].end),
                    second: (pair[1].start, pair[1].end),
                });
            }
        }

        let mut out = String::with_capacity(src.len() + self.edits.len() * 16);
        let mut segments = Vec::with_capacity(self.edits.len());
        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&src[cursor..edit.start]);
            let gen_start = out.len();
            out.push_str(&edit.text);
            segments.push(MapSegment {
                src_start: edit.start,
                src_end: edit.end,
                gen_start,
                gen_end: out.len(),
            });
            cursor = edit.end;
        }
        out.push_str(&src[cursor..]);

        Ok((
            out,
            SourceMap {
                file: file.to_owned(),
                segments,
            },
        ))
    }
}
