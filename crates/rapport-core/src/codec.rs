//! Field value codec.
//!
//! Converts between the semantic value a caller works with ([`FieldData`]) and
//! the JSON payload persisted for a field value. Every function here is pure.
//!
//! Decoding is total: a payload that does not fit the field's current kind
//! (legacy data, a kind changed after values were saved, hand-edited rows)
//! decodes to the kind's empty value instead of failing.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::defaults;
use crate::error::FieldError;
use crate::models::{FieldDefinition, FieldKind};
use crate::registry::ValueShape;

/// Semantic value of a custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldData {
    /// text, textarea, email, phone, url
    Text(String),
    /// number, currency
    Number(Option<f64>),
    Date(Option<NaiveDate>),
    Checkbox(bool),
    /// dropdown
    Choice(String),
    /// multi_select, ordered and de-duplicated
    MultiChoice(Vec<String>),
}

impl FieldData {
    pub fn text(s: impl Into<String>) -> Self {
        FieldData::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        FieldData::Number(Some(n))
    }

    pub fn date(d: NaiveDate) -> Self {
        FieldData::Date(Some(d))
    }

    pub fn choice(s: impl Into<String>) -> Self {
        FieldData::Choice(s.into())
    }

    pub fn multi<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldData::MultiChoice(items.into_iter().map(Into::into).collect())
    }

    /// Canonical empty value for a kind: `""`, `None`, `false` or `[]`.
    pub fn empty_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text
            | FieldKind::Textarea
            | FieldKind::Email
            | FieldKind::Phone
            | FieldKind::Url => FieldData::Text(String::new()),
            FieldKind::Number | FieldKind::Currency => FieldData::Number(None),
            FieldKind::Date => FieldData::Date(None),
            FieldKind::Checkbox => FieldData::Checkbox(false),
            FieldKind::Dropdown => FieldData::Choice(String::new()),
            FieldKind::MultiSelect => FieldData::MultiChoice(Vec::new()),
        }
    }

    /// True when the value carries no answer. A `false` checkbox counts as
    /// empty because absence decodes to `false`.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldData::Text(s) | FieldData::Choice(s) => s.trim().is_empty(),
            FieldData::Number(n) => n.is_none(),
            FieldData::Date(d) => d.is_none(),
            FieldData::Checkbox(b) => !b,
            FieldData::MultiChoice(items) => items.is_empty(),
        }
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            FieldData::Text(_) => ValueShape::Text,
            FieldData::Number(_) => ValueShape::Number,
            FieldData::Date(_) => ValueShape::Date,
            FieldData::Checkbox(_) => ValueShape::Checkbox,
            FieldData::Choice(_) => ValueShape::Choice,
            FieldData::MultiChoice(_) => ValueShape::MultiChoice,
        }
    }

    /// Option labels this value selects (choice shapes only).
    pub fn selected_options(&self) -> Vec<&str> {
        match self {
            FieldData::Choice(s) if !s.trim().is_empty() => vec![s.as_str()],
            FieldData::MultiChoice(items) => items.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a semantic value into the stored payload for `kind`.
///
/// A value whose shape does not match the kind is rejected with
/// [`FieldError::KindMismatch`]; nothing is coerced.
pub fn encode(kind: FieldKind, data: &FieldData) -> Result<JsonValue, FieldError> {
    match (kind, data) {
        (
            FieldKind::Text
            | FieldKind::Textarea
            | FieldKind::Email
            | FieldKind::Phone
            | FieldKind::Url,
            FieldData::Text(s),
        ) => Ok(JsonValue::String(s.clone())),
        (FieldKind::Number | FieldKind::Currency, FieldData::Number(n)) => Ok(n
            .filter(|v| v.is_finite())
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)),
        (FieldKind::Date, FieldData::Date(d)) => Ok(d
            .map(|d| JsonValue::String(d.format(defaults::DATE_FORMAT).to_string()))
            .unwrap_or(JsonValue::Null)),
        (FieldKind::Checkbox, FieldData::Checkbox(b)) => Ok(JsonValue::Bool(*b)),
        (FieldKind::Dropdown, FieldData::Choice(s)) => Ok(JsonValue::String(s.clone())),
        (FieldKind::MultiSelect, FieldData::MultiChoice(items)) => Ok(JsonValue::Array(
            dedup_preserving_order(items.iter().cloned())
                .into_iter()
                .map(JsonValue::String)
                .collect(),
        )),
        (expected, other) => Err(FieldError::KindMismatch {
            expected,
            got: other.shape().to_string(),
        }),
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode a stored payload for `kind`. Never fails.
pub fn decode(kind: FieldKind, payload: &JsonValue) -> FieldData {
    if payload.is_null() {
        return FieldData::empty_for(kind);
    }

    let decoded = match kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Email
        | FieldKind::Phone
        | FieldKind::Url => payload.as_str().map(|s| FieldData::Text(s.to_string())),
        FieldKind::Number => decode_number(payload, false).map(|n| FieldData::Number(Some(n))),
        FieldKind::Currency => decode_number(payload, true).map(|n| FieldData::Number(Some(n))),
        FieldKind::Date => payload
            .as_str()
            .and_then(parse_date)
            .map(|d| FieldData::Date(Some(d))),
        FieldKind::Checkbox => decode_bool(payload).map(FieldData::Checkbox),
        FieldKind::Dropdown => payload.as_str().map(|s| FieldData::Choice(s.to_string())),
        FieldKind::MultiSelect => decode_multi(payload).map(FieldData::MultiChoice),
    };

    decoded.unwrap_or_else(|| {
        debug!(
            subsystem = "core",
            component = "codec",
            op = "decode",
            field_kind = %kind,
            "Stored payload does not fit field kind, using empty value"
        );
        FieldData::empty_for(kind)
    })
}

fn decode_number(payload: &JsonValue, currency: bool) -> Option<f64> {
    match payload {
        JsonValue::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        JsonValue::String(s) => parse_decimal(s, currency),
        _ => None,
    }
}

fn decode_bool(payload: &JsonValue) -> Option<bool> {
    match payload {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => parse_bool(s),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn decode_multi(payload: &JsonValue) -> Option<Vec<String>> {
    match payload {
        JsonValue::Array(items) => Some(dedup_preserving_order(
            items.iter().filter_map(|v| v.as_str().map(str::to_string)),
        )),
        // Legacy rows stored a single scalar.
        JsonValue::String(s) if s.is_empty() => Some(Vec::new()),
        JsonValue::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

/// Value used when an entity has no stored value for `def`.
///
/// The stored default goes through [`decode`], so defaults and saved values
/// share one decoding path.
pub fn default_for(def: &FieldDefinition) -> FieldData {
    decode(
        def.field_kind,
        def.default_value.as_ref().unwrap_or(&JsonValue::Null),
    )
}

// =============================================================================
// FORM INPUT
// =============================================================================

/// Convert raw form input into the semantic value for `kind`.
///
/// Unparsable numbers and dates become `None`; they never error.
pub fn parse_input(kind: FieldKind, raw: &str) -> FieldData {
    match kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Email
        | FieldKind::Phone
        | FieldKind::Url => FieldData::Text(raw.to_string()),
        FieldKind::Number => FieldData::Number(parse_decimal(raw, false)),
        FieldKind::Currency => FieldData::Number(parse_decimal(raw, true)),
        FieldKind::Date => FieldData::Date(parse_date(raw)),
        FieldKind::Checkbox => FieldData::Checkbox(parse_bool(raw).unwrap_or(false)),
        FieldKind::Dropdown => FieldData::Choice(raw.trim().to_string()),
        FieldKind::MultiSelect => FieldData::MultiChoice(dedup_preserving_order(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )),
    }
}

/// Locale-free decimal parsing: optional sign, digits, at most one `.`.
///
/// Currency input may additionally carry `$` and `,`/`_` group separators.
/// Exponents, `inf` and `NaN` are rejected.
pub fn parse_decimal(raw: &str, currency: bool) -> Option<f64> {
    let mut cleaned: String = raw.trim().to_string();
    if currency {
        cleaned.retain(|c| !matches!(c, '$' | ',' | '_') && !c.is_whitespace());
    }

    let digits = cleaned
        .strip_prefix('-')
        .or_else(|| cleaned.strip_prefix('+'))
        .unwrap_or(&cleaned);

    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `YYYY-MM-DD`, or take the date part of an RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    NaiveDate::parse_from_str(s, defaults::DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// De-duplicate exact strings keeping the first occurrence.
pub fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// =============================================================================
// DISPLAY
// =============================================================================

/// Read-only rendering of a value for listings.
pub fn display_value(kind: FieldKind, data: &FieldData) -> String {
    match data {
        FieldData::Text(s) | FieldData::Choice(s) => s.clone(),
        FieldData::Number(None) | FieldData::Date(None) => String::new(),
        FieldData::Number(Some(n)) if kind == FieldKind::Currency => format!("{:.2}", n),
        FieldData::Number(Some(n)) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                n.to_string()
            }
        }
        FieldData::Date(Some(d)) => d.format(defaults::DATE_FORMAT).to_string(),
        FieldData::Checkbox(true) => "Yes".to_string(),
        FieldData::Checkbox(false) => "No".to_string(),
        FieldData::MultiChoice(items) => items.join(defaults::MULTI_SELECT_DISPLAY_SEPARATOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_trip_for_every_kind() {
        let samples = vec![
            (FieldKind::Text, FieldData::text("Jane")),
            (FieldKind::Textarea, FieldData::text("line one\nline two")),
            (FieldKind::Email, FieldData::text("jane@example.com")),
            (FieldKind::Phone, FieldData::text("+1 (555) 010-2000")),
            (FieldKind::Url, FieldData::text("https://example.com")),
            (FieldKind::Number, FieldData::number(-42.0)),
            (FieldKind::Currency, FieldData::number(12.5)),
            (FieldKind::Currency, FieldData::number(250000.0)),
            (FieldKind::Date, FieldData::date(ymd(2024, 2, 29))),
            (FieldKind::Checkbox, FieldData::Checkbox(true)),
            (FieldKind::Checkbox, FieldData::Checkbox(false)),
            (FieldKind::Dropdown, FieldData::choice("Gold")),
            (FieldKind::MultiSelect, FieldData::multi(["a", "b"])),
        ];
        for (kind, value) in samples {
            let encoded = encode(kind, &value).unwrap();
            assert_eq!(decode(kind, &encoded), value, "kind {}", kind);
        }
    }

    #[test]
    fn test_empty_values_round_trip() {
        for kind in FieldKind::ALL {
            let empty = FieldData::empty_for(kind);
            let encoded = encode(kind, &empty).unwrap();
            assert_eq!(decode(kind, &encoded), empty, "kind {}", kind);
        }
    }

    #[test]
    fn test_malformed_payloads_decode_to_empty() {
        let garbage = vec![
            json!({"nested": true}),
            json!([[1, 2], {"x": 1}]),
            json!(3.5),
            json!("not-a-date-or-number"),
            json!(true),
        ];
        for kind in FieldKind::ALL {
            for payload in &garbage {
                let decoded = decode(kind, payload);
                assert_eq!(decoded.shape(), FieldData::empty_for(kind).shape());
            }
            assert_eq!(decode(kind, &json!({"a": 1})), FieldData::empty_for(kind));
        }
    }

    #[test]
    fn test_absent_checkbox_is_false() {
        assert_eq!(decode(FieldKind::Checkbox, &JsonValue::Null), FieldData::Checkbox(false));
    }

    #[test]
    fn test_multi_select_wraps_legacy_scalar() {
        assert_eq!(
            decode(FieldKind::MultiSelect, &json!("Gold")),
            FieldData::multi(["Gold"])
        );
        assert_eq!(
            decode(FieldKind::MultiSelect, &json!("")),
            FieldData::MultiChoice(vec![])
        );
    }

    #[test]
    fn test_multi_select_drops_non_string_items() {
        assert_eq!(
            decode(FieldKind::MultiSelect, &json!(["a", 1, null, "b", "a"])),
            FieldData::multi(["a", "b"])
        );
    }

    #[test]
    fn test_multi_select_encode_dedups() {
        let encoded = encode(FieldKind::MultiSelect, &FieldData::multi(["x", "y", "x"])).unwrap();
        assert_eq!(encoded, json!(["x", "y"]));
    }

    #[test]
    fn test_number_decodes_numeric_strings() {
        assert_eq!(decode(FieldKind::Number, &json!("12.75")), FieldData::number(12.75));
        assert_eq!(decode(FieldKind::Currency, &json!("$1,200.50")), FieldData::number(1200.5));
        assert_eq!(decode(FieldKind::Number, &json!("1,200")), FieldData::Number(None));
    }

    #[test]
    fn test_non_finite_numbers_encode_to_null() {
        let encoded = encode(FieldKind::Number, &FieldData::Number(Some(f64::NAN))).unwrap();
        assert_eq!(encoded, JsonValue::Null);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let err = encode(FieldKind::Currency, &FieldData::text("250000")).unwrap_err();
        assert_eq!(
            err,
            FieldError::KindMismatch {
                expected: FieldKind::Currency,
                got: "text".to_string()
            }
        );
        assert!(encode(FieldKind::Dropdown, &FieldData::multi(["a"])).is_err());
    }

    #[test]
    fn test_parse_decimal_is_locale_free() {
        assert_eq!(parse_decimal("250000.00", false), Some(250000.0));
        assert_eq!(parse_decimal("  -3.5 ", false), Some(-3.5));
        assert_eq!(parse_decimal("+7", false), Some(7.0));
        assert_eq!(parse_decimal(".5", false), Some(0.5));
        assert_eq!(parse_decimal("1,5", false), None);
        assert_eq!(parse_decimal("1e5", false), None);
        assert_eq!(parse_decimal("NaN", false), None);
        assert_eq!(parse_decimal("inf", false), None);
        assert_eq!(parse_decimal("1.2.3", false), None);
        assert_eq!(parse_decimal("", false), None);
        assert_eq!(parse_decimal("-", false), None);
        assert_eq!(parse_decimal("$ 1,000_000.25", true), Some(1000000.25));
        assert_eq!(parse_decimal("$", true), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-01-31"), Some(ymd(2025, 1, 31)));
        assert_eq!(parse_date("2025-01-31T23:00:00+00:00"), Some(ymd(2025, 1, 31)));
        assert_eq!(parse_date("31/01/2025"), None);
        assert_eq!(parse_date("2025-02-30"), None);
    }

    #[test]
    fn test_parse_input_per_kind() {
        assert_eq!(parse_input(FieldKind::Currency, "$250,000.00"), FieldData::number(250000.0));
        assert_eq!(parse_input(FieldKind::Number, "abc"), FieldData::Number(None));
        assert_eq!(parse_input(FieldKind::Checkbox, "on"), FieldData::Checkbox(true));
        assert_eq!(parse_input(FieldKind::Checkbox, "maybe"), FieldData::Checkbox(false));
        assert_eq!(parse_input(FieldKind::Dropdown, " Gold "), FieldData::choice("Gold"));
        assert_eq!(
            parse_input(FieldKind::MultiSelect, "a, b,,a , c"),
            FieldData::multi(["a", "b", "c"])
        );
        assert_eq!(parse_input(FieldKind::Textarea, "  keep  "), FieldData::text("  keep  "));
    }

    #[test]
    fn test_checkbox_decode_variants() {
        assert_eq!(decode(FieldKind::Checkbox, &json!("1")), FieldData::Checkbox(true));
        assert_eq!(decode(FieldKind::Checkbox, &json!(0)), FieldData::Checkbox(false));
        assert_eq!(decode(FieldKind::Checkbox, &json!(7)), FieldData::Checkbox(false));
    }

    #[test]
    fn test_is_empty() {
        assert!(FieldData::text("   ").is_empty());
        assert!(FieldData::Checkbox(false).is_empty());
        assert!(!FieldData::number(0.0).is_empty());
        assert!(FieldData::MultiChoice(vec![]).is_empty());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(FieldKind::Currency, &FieldData::number(250000.0)), "250000.00");
        assert_eq!(display_value(FieldKind::Number, &FieldData::number(3.0)), "3");
        assert_eq!(display_value(FieldKind::Number, &FieldData::number(3.25)), "3.25");
        assert_eq!(display_value(FieldKind::Checkbox, &FieldData::Checkbox(true)), "Yes");
        assert_eq!(display_value(FieldKind::MultiSelect, &FieldData::multi(["a", "b"])), "a, b");
        assert_eq!(display_value(FieldKind::Date, &FieldData::Date(None)), "");
    }

    #[test]
    fn test_selected_options() {
        assert_eq!(FieldData::choice("Gold").selected_options(), vec!["Gold"]);
        assert!(FieldData::choice("").selected_options().is_empty());
        assert_eq!(FieldData::multi(["a", "b"]).selected_options(), vec!["a", "b"]);
        assert!(FieldData::text("a").selected_options().is_empty());
    }

    #[test]
    fn test_default_for_decodes_stored_default() {
        let now = chrono::Utc::now();
        let mut def = FieldDefinition {
            id: uuid::Uuid::new_v4(),
            type_id: uuid::Uuid::new_v4(),
            name: "Tier".to_string(),
            field_kind: FieldKind::Dropdown,
            description: None,
            is_required: false,
            default_value: Some(json!("Silver")),
            options: vec!["Silver".to_string()],
            display_order: 0,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(default_for(&def), FieldData::choice("Silver"));

        // Kind changed after the default was stored: falls back to empty.
        def.field_kind = FieldKind::Date;
        assert_eq!(default_for(&def), FieldData::Date(None));

        def.default_value = None;
        def.field_kind = FieldKind::Checkbox;
        assert_eq!(default_for(&def), FieldData::Checkbox(false));
    }

    #[test]
    fn test_field_data_serde_shape() {
        let json = serde_json::to_value(FieldData::number(1.5)).unwrap();
        assert_eq!(json, json!({"type": "number", "value": 1.5}));
    }
}
