// SPDX-FileCopyrightText: 2026 Tabtalk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outgoing payload assembly: merging resolved attachments into the
//! caller-supplied content and metadata.

use serde_json::{Map, Value};

use tabtalk_core::Attachment;

/// Substituted when a message has no text but at least one attachment made
/// it into the payload; the dispatch contract never sends empty content.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "[attachment]";

/// Build the final `(content, metadata)` pair for dispatch.
///
/// Completed attachments with a usable remote reference are appended, in slot
/// order, AFTER any `attachments` array already present in the caller
/// metadata; pre-existing entries are never reordered. Failed or
/// reference-less slots are omitted.
pub(crate) fn build_payload(
    content: &str,
    metadata: Option<&Map<String, Value>>,
    attachments: &[Attachment],
) -> (String, Option<Map<String, Value>>) {
    let merged: Vec<Value> = attachments
        .iter()
        .filter(|a| a.is_sendable())
        .map(attachment_value)
        .collect();

    if merged.is_empty() {
        return (content.to_string(), metadata.cloned());
    }

    let mut map = metadata.cloned().unwrap_or_default();
    match map
        .entry("attachments".to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(existing) => existing.extend(merged),
        other => {
            // A caller put a non-array under "attachments"; keep it first.
            let prior = other.take();
            *other = Value::Array(std::iter::once(prior).chain(merged).collect());
        }
    }

    let content = if content.is_empty() {
        EMPTY_CONTENT_PLACEHOLDER.to_string()
    } else {
        content.to_string()
    };
    (content, Some(map))
}

fn attachment_value(a: &Attachment) -> Value {
    let mut obj = Map::new();
    obj.insert("upload_id".to_string(), Value::String(a.upload_id.0.clone()));
    if let Some(uri) = &a.file_uri {
        obj.insert("file_uri".to_string(), Value::String(uri.clone()));
    }
    if let Some(id) = &a.file_id {
        obj.insert("file_id".to_string(), Value::String(id.clone()));
    }
    if let Some(mime) = &a.mime_type {
        obj.insert("mime_type".to_string(), Value::String(mime.clone()));
    }
    if let Some(preview) = &a.preview {
        obj.insert("preview".to_string(), Value::String(preview.clone()));
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabtalk_core::{UploadId, UploadResult, UploadStatus};

    fn completed(id: &str, uri: &str) -> Attachment {
        let mut a = Attachment::new(UploadId(id.into()), UploadStatus::Uploading);
        a.complete(&UploadResult {
            file_uri: Some(uri.into()),
            mime_type: Some("image/png".into()),
            ..Default::default()
        });
        a
    }

    #[test]
    fn no_attachments_passes_payload_through() {
        let (content, metadata) = build_payload("hi", None, &[]);
        assert_eq!(content, "hi");
        assert!(metadata.is_none());
    }

    #[test]
    fn failed_attachments_are_omitted() {
        let mut failed = Attachment::new(UploadId("u-1".into()), UploadStatus::Pending);
        failed.fail("timeout");

        let (content, metadata) = build_payload("hi", None, &[failed]);
        assert_eq!(content, "hi");
        assert!(metadata.is_none(), "nothing usable, metadata untouched");
    }

    #[test]
    fn completed_attachments_land_in_metadata() {
        let (content, metadata) =
            build_payload("look", None, &[completed("u-1", "https://f/x.png")]);
        assert_eq!(content, "look");

        let map = metadata.expect("metadata created for attachments");
        let list = map["attachments"].as_array().expect("array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["upload_id"], "u-1");
        assert_eq!(list[0]["file_uri"], "https://f/x.png");
        assert_eq!(list[0]["mime_type"], "image/png");
    }

    #[test]
    fn merged_attachments_append_after_existing_ones() {
        let mut metadata = Map::new();
        metadata.insert("attachments".to_string(), json!([{"file_uri": "pre"}]));
        metadata.insert("tab_url".to_string(), json!("https://example.com"));

        let (_, out) = build_payload(
            "hi",
            Some(&metadata),
            &[completed("u-1", "a"), completed("u-2", "b")],
        );
        let map = out.expect("metadata present");
        let list = map["attachments"].as_array().expect("array");
        assert_eq!(list.len(), 3);
        assert_eq!(list[0]["file_uri"], "pre");
        assert_eq!(list[1]["file_uri"], "a");
        assert_eq!(list[2]["file_uri"], "b");
        // Unrelated keys survive untouched.
        assert_eq!(map["tab_url"], "https://example.com");
    }

    #[test]
    fn empty_content_becomes_placeholder_only_with_merged_attachments() {
        let (content, _) = build_payload("", None, &[completed("u-1", "a")]);
        assert_eq!(content, EMPTY_CONTENT_PLACEHOLDER);

        // No usable attachment: empty content stays empty.
        let (content, _) = build_payload("", None, &[]);
        assert_eq!(content, "");
    }

    #[test]
    fn completed_without_reference_is_skipped() {
        let mut a = Attachment::new(UploadId("u-1".into()), UploadStatus::Uploading);
        a.complete(&UploadResult {
            mime_type: Some("image/png".into()),
            ..Default::default()
        });
        let (_, metadata) = build_payload("hi", None, &[a]);
        assert!(metadata.is_none());
    }

    #[test]
    fn non_array_attachments_value_is_preserved_first() {
        let mut metadata = Map::new();
        metadata.insert("attachments".to_string(), json!("legacy"));

        let (_, out) = build_payload("hi", Some(&metadata), &[completed("u-1", "a")]);
        let list = out.expect("metadata")["attachments"]
            .as_array()
            .expect("coerced to array")
            .clone();
        assert_eq!(list[0], json!("legacy"));
        assert_eq!(list[1]["file_uri"], "a");
    }
}
