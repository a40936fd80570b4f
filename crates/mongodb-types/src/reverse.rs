//! Reverse conversion: BSON value → message-safe values.
//!
//! Messages leave the sync as JSON, so every BSON type that has no portable
//! JSON form is coerced into a canonical scalar: ObjectIds become hex,
//! datetimes become RFC 3339 strings, binaries become base64.

use base64::{engine::general_purpose, Engine as _};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Short lowercase name of a BSON value's type, used in error messages.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

/// Convert a BSON datetime into an RFC 3339 string with millisecond precision.
pub fn datetime_to_rfc3339(dt: &bson::DateTime) -> String {
    dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn binary_to_text(bin: &Binary) -> String {
    if matches!(bin.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld) {
        if let Ok(uuid) = uuid::Uuid::from_slice(&bin.bytes) {
            return uuid.to_string();
        }
    }
    general_purpose::STANDARD.encode(&bin.bytes)
}

/// Canonical scalar text of a BSON value.
///
/// Returns `None` for null-like values and for containers (arrays,
/// documents), which have no single scalar form.
pub fn bson_to_text(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) | Bson::Symbol(s) => Some(s.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::DateTime(dt) => Some(datetime_to_rfc3339(dt)),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(f) if f.is_finite() => Some(f.to_string()),
        Bson::Decimal128(d) => Some(d.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        Bson::Binary(bin) => Some(binary_to_text(bin)),
        Bson::Timestamp(ts) => Some(format!("{}:{}", ts.time, ts.increment)),
        _ => None,
    }
}

/// Convert any BSON value into a JSON value safe to put on the wire.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined | Bson::MaxKey | Bson::MinKey | Bson::DbPointer(_) => {
            Value::Null
        }
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Number((*i).into()),
        Bson::Int64(i) => Value::Number((*i).into()),
        Bson::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_json(doc)),
        Bson::RegularExpression(re) => Value::String(format!("/{}/{}", re.pattern, re.options)),
        Bson::JavaScriptCode(code) => Value::String(code.clone()),
        Bson::JavaScriptCodeWithScope(code) => Value::String(code.code.clone()),
        Bson::ObjectId(_)
        | Bson::DateTime(_)
        | Bson::Decimal128(_)
        | Bson::Binary(_)
        | Bson::Timestamp(_) => bson_to_text(value).map_or(Value::Null, Value::String),
    }
}

/// Convert a BSON document into a JSON object.
///
/// Keys come out sorted, so equal documents always serialize identically.
pub fn document_to_json(doc: &bson::Document) -> Map<String, Value> {
    let sorted: BTreeMap<&String, Value> = doc.iter().map(|(k, v)| (k, bson_to_json(v))).collect();
    sorted
        .into_iter()
        .map(|(k, v)| (k.clone(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bson::{doc, Regex, Timestamp};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_object_id_and_datetime_are_coerced_to_strings() {
        let oid = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let dt = bson::DateTime::from_millis(1_700_000_000_123);

        assert_eq!(
            bson_to_json(&Bson::ObjectId(oid)),
            json!("65a1f0c2e4b0a1b2c3d4e5f6")
        );
        assert_eq!(
            bson_to_json(&Bson::DateTime(dt)),
            json!("2023-11-14T22:13:20.123Z")
        );
    }

    #[test]
    fn test_nested_document_conversion() {
        let doc = doc! {
            "b": [1_i32, 2_i64, "x"],
            "a": { "when": bson::DateTime::from_millis(0), "none": Bson::Null },
            "re": Regex { pattern: "^a".to_string(), options: "i".to_string() },
            "ts": Timestamp { time: 10, increment: 2 },
        };

        assert_eq!(
            Value::Object(document_to_json(&doc)),
            json!({
                "a": { "none": null, "when": "1970-01-01T00:00:00.000Z" },
                "b": [1, 2, "x"],
                "re": "/^a/i",
                "ts": "10:2",
            })
        );
    }

    #[test]
    fn test_non_finite_double_becomes_null() {
        assert_eq!(bson_to_json(&Bson::Double(f64::NAN)), Value::Null);
        assert_eq!(bson_to_json(&Bson::Double(1.5)), json!(1.5));
        assert_eq!(bson_to_text(&Bson::Double(f64::INFINITY)), None);
    }

    #[test]
    fn test_binary_conversion() {
        let uuid = Binary {
            subtype: BinarySubtype::Uuid,
            bytes: (0u8..16).collect(),
        };
        assert_eq!(
            bson_to_text(&Bson::Binary(uuid)).unwrap(),
            "00010203-0405-0607-0809-0a0b0c0d0e0f"
        );

        // Not 16 bytes, so not a UUID despite the subtype.
        let short = Binary {
            subtype: BinarySubtype::Uuid,
            bytes: vec![1, 2, 3],
        };
        assert_eq!(bson_to_text(&Bson::Binary(short)).unwrap(), "AQID");

        let generic = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1, 2, 3],
        };
        assert_eq!(bson_to_json(&Bson::Binary(generic)), json!("AQID"));
    }

    #[test]
    fn test_containers_have_no_scalar_text() {
        assert_eq!(bson_to_text(&Bson::Array(vec![])), None);
        assert_eq!(bson_to_text(&Bson::Document(doc! {})), None);
        assert_eq!(bson_to_text(&Bson::Null), None);
    }
}
