//! Text-Edit Engine (spec §4.5).
//!
//! Applies a batch of positioned edits to a document's Unicode scalar
//! value sequence, producing the new content or a precise error. The
//! operation is all-or-nothing: either every edit is reflected in the
//! returned document, or an error is returned and no partial document is
//! exposed.

use crate::error::BridgeError;
use crate::model::{Position, Range, TextEdit};

/// Resolve a [`Position`] to a scalar-value offset within `content`, by
/// walking the document counting `\n` for line increments and other
/// scalars for character increments. The position immediately after the
/// final character is legal.
pub fn resolve_position(content: &str, position: Position) -> Result<usize, BridgeError> {
    let mut line = 0u32;
    let mut character = 0u32;
    let mut offset = 0usize;

    for ch in content.chars() {
        if line == position.line && character == position.character {
            return Ok(offset);
        }
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += 1;
        }
        offset += ch.len_utf8();
    }

    if line == position.line && character == position.character {
        return Ok(offset);
    }

    Err(BridgeError::out_of_bounds(format!(
        "position {}:{} is outside the document",
        position.line, position.character
    )))
}

fn resolve_range(content: &str, range: Option<Range>) -> Result<(usize, usize), BridgeError> {
    let Some(range) = range else {
        return Ok((0, content.len()));
    };

    let start = resolve_position(content, range.start)?;
    let end = resolve_position(content, range.end)?;

    if end < start {
        return Err(BridgeError::out_of_bounds(format!(
            "range end ({}:{}) precedes start ({}:{})",
            range.end.line, range.end.character, range.start.line, range.start.character
        )));
    }

    Ok((start, end))
}

/// Apply `edits` to `content`, returning the new document.
///
/// Edits are resolved to byte offsets, validated, sorted by descending
/// start offset (ties broken by descending end offset), and spliced in
/// left-to-right over the sorted list — this lets later-in-document edits
/// be applied without recomputing offsets invalidated by earlier ones.
/// Callers are expected not to submit overlapping edits; the descending
/// sort makes overlaps resolve by letting earlier-starting edits see the
/// post-state of later-starting ones.
pub fn apply_edits(content: &str, edits: &[TextEdit]) -> Result<String, BridgeError> {
    let mut resolved: Vec<(usize, usize, &str)> = Vec::with_capacity(edits.len());
    for edit in edits {
        let (start, end) = resolve_range(content, edit.range)?;
        if end > content.len() {
            return Err(BridgeError::out_of_bounds(format!(
                "edit range end offset {end} exceeds document length {}",
                content.len()
            )));
        }
        resolved.push((start, end, edit.new_text.as_str()));
    }

    resolved.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut result = content.to_string();
    for (start, end, new_text) in resolved {
        result.replace_range(start..end, new_text);
    }

    Ok(result)
}
