//! Core domain model and field-coercion rules for skuflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CRATE_NAME: &str = "skuflow-core";

/// Product record as the source API sends it.
///
/// `id` and `price` stay loosely typed on purpose: the source occasionally
/// emits non-numeric junk in either field, and a bad value must degrade to
/// null downstream instead of failing the whole batch. The raw artifact on
/// disk is the verbatim response; this type is only the transform stage's
/// reading of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawProduct {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub rating: Option<RawRating>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawRating {
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub count: Option<Value>,
}

/// Flattened, type-normalized record written to the cleaned artifact.
///
/// `processed_at_utc` and `source_file` are provenance fields tracing the
/// record back to the raw snapshot it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedProduct {
    pub product_id: Option<i64>,
    pub title: Option<String>,
    pub price_usd: Option<f64>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub rating_rate: Option<f64>,
    pub rating_count: Option<i64>,
    pub processed_at_utc: String,
    pub source_file: String,
}

impl CleanedProduct {
    /// Flatten one raw record. A missing `rating` object behaves like an
    /// empty one, so both rating fields come out null rather than erroring.
    pub fn from_raw(raw: &RawProduct, processed_at_utc: &str, source_file: &str) -> Self {
        let rating = raw.rating.clone().unwrap_or_default();
        Self {
            product_id: raw.id.as_ref().and_then(coerce_id),
            title: raw.title.clone(),
            price_usd: raw.price.as_ref().and_then(coerce_price),
            description: raw.description.clone(),
            category: raw.category.clone(),
            image_url: raw.image.clone(),
            rating_rate: rating.rate,
            rating_count: rating.count.as_ref().and_then(coerce_id),
            processed_at_utc: processed_at_utc.to_string(),
            source_file: source_file.to_string(),
        }
    }
}

/// Lossy integer coercion: JSON numbers and numeric strings become `i64`,
/// everything else (including fractional values) becomes `None`.
pub fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Lossy float coercion with the same null-on-failure policy as [`coerce_id`].
pub fn coerce_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Batch processing stamp: ISO 8601, second precision, `Z` suffix.
pub fn processed_at_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn coerce_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_id(&json!(7)), Some(7));
        assert_eq!(coerce_id(&json!(7.0)), Some(7));
        assert_eq!(coerce_id(&json!("42")), Some(42));
        assert_eq!(coerce_id(&json!(" 42 ")), Some(42));
        assert_eq!(coerce_id(&json!("7.0")), Some(7));
    }

    #[test]
    fn coerce_id_degrades_junk_to_null() {
        assert_eq!(coerce_id(&json!("abc")), None);
        assert_eq!(coerce_id(&json!(7.5)), None);
        assert_eq!(coerce_id(&json!(null)), None);
        assert_eq!(coerce_id(&json!([1])), None);
    }

    #[test]
    fn coerce_price_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_price(&json!(9.99)), Some(9.99));
        assert_eq!(coerce_price(&json!("9.99")), Some(9.99));
        assert_eq!(coerce_price(&json!(10)), Some(10.0));
        assert_eq!(coerce_price(&json!("free")), None);
        assert_eq!(coerce_price(&json!({})), None);
    }

    #[test]
    fn missing_rating_yields_null_rating_fields() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 1,
            "title": "Widget",
            "price": 9.99
        }))
        .expect("raw product");

        let cleaned = CleanedProduct::from_raw(&raw, "2026-08-29T06:00:00Z", "products_raw_x.json");
        assert_eq!(cleaned.product_id, Some(1));
        assert_eq!(cleaned.price_usd, Some(9.99));
        assert_eq!(cleaned.rating_rate, None);
        assert_eq!(cleaned.rating_count, None);
    }

    #[test]
    fn non_numeric_id_coerces_to_null_without_failing() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": "not-a-number",
            "title": "Odd Widget",
            "price": "2.50",
            "rating": {"rate": 4.5, "count": 10}
        }))
        .expect("raw product");

        let cleaned = CleanedProduct::from_raw(&raw, "2026-08-29T06:00:00Z", "products_raw_x.json");
        assert_eq!(cleaned.product_id, None);
        assert_eq!(cleaned.price_usd, Some(2.50));
        assert_eq!(cleaned.rating_rate, Some(4.5));
        assert_eq!(cleaned.rating_count, Some(10));
    }

    #[test]
    fn processing_stamp_is_second_precision_zulu() {
        let at = Utc.with_ymd_and_hms(2026, 8, 29, 6, 30, 15).single().expect("ts");
        assert_eq!(processed_at_stamp(at), "2026-08-29T06:30:15Z");
    }

    #[test]
    fn unknown_source_fields_are_ignored() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 3,
            "title": "Widget",
            "warehouse": "B2"
        }))
        .expect("raw product");
        assert_eq!(raw.id, Some(json!(3)));
        assert_eq!(raw.category, None);
    }
}
