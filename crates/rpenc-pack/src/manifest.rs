//! `manifest.json` parsing: only the fields the engine needs

use rpenc_core::{RpencError, RpencResult};
use rpenc_crypto::PackUuid;
use serde_json::Value;

/// Pack identity read from `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackManifest {
    /// `header.uuid`, embedded in the contents.json header
    pub uuid: PackUuid,
    /// `header.name`, if present (used for logging only)
    pub name: Option<String>,
}

impl PackManifest {
    /// Parse `manifest.json` bytes. `header.uuid` must be a 36-byte string.
    pub fn parse(contents: &[u8]) -> RpencResult<Self> {
        let data: Value = serde_json::from_slice(contents)
            .map_err(|e| RpencError::ManifestInvalid(format!("failed to parse manifest.json: {e}")))?;

        let header = data.get("header");
        let uuid = match header.and_then(|h| h.get("uuid")) {
            None | Some(Value::Null) => {
                return Err(RpencError::ManifestInvalid(
                    "manifest.json must define header.uuid".into(),
                ))
            }
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(RpencError::ManifestInvalid(format!(
                    "header.uuid must be a string (received {})",
                    json_type(other)
                )))
            }
        };
        let uuid = PackUuid::try_from(uuid.as_str())
            .map_err(|e| RpencError::ManifestInvalid(format!("improper header.uuid: {e}")))?;

        let name = header
            .and_then(|h| h.get("name"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self { uuid, name })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "0f7a6c2e-4d1b-4c3a-9e8f-7b6a5d4c3b2a";

    fn invalid_message(json: &str) -> String {
        match PackManifest::parse(json.as_bytes()) {
            Err(RpencError::ManifestInvalid(msg)) => msg,
            other => panic!("expected ManifestInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_valid() {
        let json = format!(
            r#"{{"format_version": 2, "header": {{"name": "Stone Pack", "uuid": "{UUID}", "version": [1, 0, 0]}}}}"#
        );
        let manifest = PackManifest::parse(json.as_bytes()).unwrap();
        assert_eq!(manifest.uuid.as_str(), UUID);
        assert_eq!(manifest.name.as_deref(), Some("Stone Pack"));
    }

    #[test]
    fn test_name_optional() {
        let json = format!(r#"{{"header": {{"uuid": "{UUID}"}}}}"#);
        let manifest = PackManifest::parse(json.as_bytes()).unwrap();
        assert!(manifest.name.is_none());
    }

    #[test]
    fn test_unparsable() {
        assert!(invalid_message("{not json").contains("failed to parse"));
    }

    #[test]
    fn test_missing_header_or_uuid() {
        assert!(invalid_message(r#"{"modules": []}"#).contains("must define"));
        assert!(invalid_message(r#"{"header": {"name": "x"}}"#).contains("must define"));
        assert!(invalid_message(r#"{"header": {"uuid": null}}"#).contains("must define"));
    }

    #[test]
    fn test_uuid_not_string() {
        let msg = invalid_message(r#"{"header": {"uuid": 12345}}"#);
        assert!(msg.contains("must be a string"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn test_uuid_wrong_length() {
        assert!(invalid_message(r#"{"header": {"uuid": "abc"}}"#).contains("improper"));
        let long = format!(r#"{{"header": {{"uuid": "{UUID}0"}}}}"#);
        assert!(invalid_message(&long).contains("improper"));
    }
}
