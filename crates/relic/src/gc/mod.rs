// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference token streams for garbage-collection tracing.
//!
//! At link time each class compiles its property chain into a compact
//! instruction sequence a tracing collector replays to visit every outgoing
//! object reference without re-walking property descriptors. Nested struct
//! fields splice the nested class's already-built stream, so building is
//! O(distinct types), not O(fields transitively).
//!
//! Soundness contract: the stream visits a superset of live references.
//! A kind that cannot be proven reference-free always contributes tokens;
//! false positives waste a visit, false negatives would corrupt the heap.

pub mod trace;

pub use trace::{trace_refs, visit_property_refs};

use crate::reflect::property::{PropertyDescriptor, PropertyKind};
use std::sync::Arc;

/// One tracing instruction.
///
/// `skip_index` on the array brackets is back-patched by the builder with
/// the stream index immediately after the matching end token, so a replay
/// over an empty array skips the whole block in O(1).
#[derive(Debug, Clone, PartialEq)]
pub enum RefToken {
    /// Object handle at `offset` relative to the current base.
    Reference { offset: usize },
    /// Fixed C-array of reference-bearing elements; inner tokens are
    /// element-relative.
    FixedArrayBegin {
        offset: usize,
        stride: usize,
        count: usize,
        skip_index: usize,
    },
    /// Closes a `FixedArrayBegin` block.
    FixedArrayEnd,
    /// Dynamic array (heap slot at `offset`); inner tokens are
    /// element-relative.
    StructArrayBegin {
        offset: usize,
        stride: usize,
        skip_index: usize,
    },
    /// Closes a `StructArrayBegin` block.
    StructArrayEnd,
    /// Map slot at `offset`; entries are walked descriptor-driven because
    /// keys and values have independent layouts.
    Map {
        offset: usize,
        key: Box<PropertyDescriptor>,
        value: Box<PropertyDescriptor>,
    },
    /// Terminates the stream.
    End,
}

/// The compiled instruction sequence for one class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenStream {
    tokens: Vec<RefToken>,
}

impl TokenStream {
    /// Instruction slice, including the trailing [`RefToken::End`].
    #[must_use]
    pub fn tokens(&self) -> &[RefToken] {
        &self.tokens
    }

    /// True when the class holds no references at all (only the `End`
    /// token, or nothing for an unlinked class).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }

    /// Token count including `End`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Compile the token stream for a full property chain (super-most first).
///
/// Nested struct classes must already be linked; their streams are spliced,
/// never rebuilt.
#[must_use]
pub fn build_token_stream(chain: &[Arc<PropertyDescriptor>]) -> TokenStream {
    let mut tokens = Vec::new();
    for prop in chain {
        emit_property(&mut tokens, prop);
    }
    tokens.push(RefToken::End);
    TokenStream { tokens }
}

fn emit_property(tokens: &mut Vec<RefToken>, prop: &PropertyDescriptor) {
    if !prop.kind.is_reference_bearing() {
        return;
    }
    if prop.array_dim > 1 {
        let begin = tokens.len();
        tokens.push(RefToken::FixedArrayBegin {
            offset: prop.offset,
            stride: prop.element_size(),
            count: prop.array_dim,
            skip_index: 0,
        });
        emit_element(tokens, &prop.kind, 0);
        tokens.push(RefToken::FixedArrayEnd);
        let skip = tokens.len();
        if let RefToken::FixedArrayBegin { skip_index, .. } = &mut tokens[begin] {
            *skip_index = skip;
        }
    } else {
        emit_element(tokens, &prop.kind, prop.offset);
    }
}

fn emit_element(tokens: &mut Vec<RefToken>, kind: &PropertyKind, offset: usize) {
    match kind {
        PropertyKind::Object | PropertyKind::Interface | PropertyKind::Delegate => {
            tokens.push(RefToken::Reference { offset });
        }
        PropertyKind::Struct(class) => {
            splice(tokens, class.token_stream().tokens(), offset);
        }
        PropertyKind::Array(inner) => {
            let begin = tokens.len();
            tokens.push(RefToken::StructArrayBegin {
                offset,
                stride: inner.element_size(),
                skip_index: 0,
            });
            emit_element(tokens, &inner.kind, 0);
            tokens.push(RefToken::StructArrayEnd);
            let skip = tokens.len();
            if let RefToken::StructArrayBegin { skip_index, .. } = &mut tokens[begin] {
                *skip_index = skip;
            }
        }
        PropertyKind::Map { key, value } => {
            tokens.push(RefToken::Map {
                offset,
                key: key.clone(),
                value: value.clone(),
            });
        }
        _ => {}
    }
}

/// Copy a nested class's stream into `tokens`, rebasing offsets of
/// top-level tokens by `offset` and skip indices by the insertion point.
/// Tokens inside array brackets stay element-relative.
fn splice(tokens: &mut Vec<RefToken>, inner: &[RefToken], offset: usize) {
    let base = tokens.len();
    let mut depth = 0usize;
    for token in inner {
        match token {
            RefToken::Reference { offset: o } => {
                let o = if depth == 0 { o + offset } else { *o };
                tokens.push(RefToken::Reference { offset: o });
            }
            RefToken::FixedArrayBegin {
                offset: o,
                stride,
                count,
                skip_index,
            } => {
                let o = if depth == 0 { o + offset } else { *o };
                tokens.push(RefToken::FixedArrayBegin {
                    offset: o,
                    stride: *stride,
                    count: *count,
                    skip_index: skip_index + base,
                });
                depth += 1;
            }
            RefToken::FixedArrayEnd => {
                tokens.push(RefToken::FixedArrayEnd);
                depth = depth.saturating_sub(1);
            }
            RefToken::StructArrayBegin {
                offset: o,
                stride,
                skip_index,
            } => {
                let o = if depth == 0 { o + offset } else { *o };
                tokens.push(RefToken::StructArrayBegin {
                    offset: o,
                    stride: *stride,
                    skip_index: skip_index + base,
                });
                depth += 1;
            }
            RefToken::StructArrayEnd => {
                tokens.push(RefToken::StructArrayEnd);
                depth = depth.saturating_sub(1);
            }
            RefToken::Map {
                offset: o,
                key,
                value,
            } => {
                let o = if depth == 0 { o + offset } else { *o };
                tokens.push(RefToken::Map {
                    offset: o,
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            RefToken::End => break,
        }
    }
}
