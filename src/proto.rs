//! Generated coordinator RPC contract, plus conversions between the wire
//! (`prost`) message types and the bridge's own [`crate::model`] types.

pub mod coordinator {
    pub mod v1 {
        tonic::include_proto!("buckley.coordinator.v1");
    }
}

use coordinator::v1 as pb;

use crate::model::{Document, EditorContext, Position, Range, TextEdit};

/// Trims `agent_id`; returns `None` for empty/whitespace-only values so
/// callers can skip sending the metadata header per spec §6.
pub fn trimmed_agent_id(agent_id: &str) -> Option<&str> {
    let trimmed = agent_id.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Attach the caller's `agent_id` to an outgoing coordinator call as the
/// `x-buckley-agent-id` metadata header, after whitespace trimming
/// (spec §6: "All endpoints propagate the caller's `agent_id` as an
/// outgoing metadata header"). Empty/whitespace-only values are skipped.
pub fn with_agent_id_header<T>(
    mut request: tonic::Request<T>,
    agent_id: &str,
) -> tonic::Request<T> {
    if let Some(trimmed) = trimmed_agent_id(agent_id)
        && let Ok(value) = tonic::metadata::MetadataValue::try_from(trimmed)
    {
        request.metadata_mut().insert("x-buckley-agent-id", value);
    }
    request
}

impl From<Position> for pb::Position {
    fn from(p: Position) -> Self {
        pb::Position {
            line: p.line,
            character: p.character,
        }
    }
}

impl From<pb::Position> for Position {
    fn from(p: pb::Position) -> Self {
        Position {
            line: p.line,
            character: p.character,
        }
    }
}

impl From<Range> for pb::Range {
    fn from(r: Range) -> Self {
        pb::Range {
            start: Some(r.start.into()),
            end: Some(r.end.into()),
        }
    }
}

impl TryFrom<pb::Range> for Range {
    type Error = crate::error::BridgeError;

    fn try_from(r: pb::Range) -> Result<Self, Self::Error> {
        Ok(Range {
            start: r
                .start
                .ok_or_else(|| crate::error::BridgeError::Parse("range missing start".into()))?
                .into(),
            end: r
                .end
                .ok_or_else(|| crate::error::BridgeError::Parse("range missing end".into()))?
                .into(),
        })
    }
}

impl From<Document> for pb::Document {
    fn from(d: Document) -> Self {
        pb::Document {
            uri: d.uri,
            language_id: d.language_id,
            content: d.content,
            selection: d.selection.map(Into::into),
            version: d.version,
        }
    }
}

impl From<EditorContext> for pb::EditorContext {
    fn from(ctx: EditorContext) -> Self {
        pb::EditorContext {
            document: Some(ctx.document.into()),
            visible_ranges: ctx.visible_ranges.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<TextEdit> for pb::TextEdit {
    fn from(edit: TextEdit) -> Self {
        pb::TextEdit {
            uri: edit.uri,
            range: edit.range.map(Into::into),
            new_text: edit.new_text,
        }
    }
}

impl TryFrom<pb::TextEdit> for TextEdit {
    type Error = crate::error::BridgeError;

    fn try_from(edit: pb::TextEdit) -> Result<Self, Self::Error> {
        Ok(TextEdit {
            uri: edit.uri,
            range: edit.range.map(Range::try_from).transpose()?,
            new_text: edit.new_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, Position};

    #[test]
    fn document_round_trips_through_proto_shape() {
        let doc = Document {
            uri: "file:///a.rs".into(),
            language_id: "rust".into(),
            content: "fn main() {}".into(),
            selection: Some(Range {
                start: Position { line: 0, character: 0 },
                end: Position { line: 0, character: 2 },
            }),
            version: 3,
        };
        let pb_doc: pb::Document = doc.clone().into();
        assert_eq!(pb_doc.uri, doc.uri);
        assert_eq!(pb_doc.version, 3);
        assert!(pb_doc.selection.is_some());
    }

    #[test]
    fn range_without_start_fails_to_convert_back() {
        let pb_range = pb::Range {
            start: None,
            end: Some(pb::Position { line: 0, character: 0 }),
        };
        assert!(Range::try_from(pb_range).is_err());
    }
}
