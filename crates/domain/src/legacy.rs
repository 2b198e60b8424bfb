//! Legacy character import.
//!
//! The predecessor system stored each template as a flat string of
//! `key=>value` pairs separated by `;`.

use serde_json::{Map, Value};

use crate::template::{coerce_value, populate_and_order_fields, Template, DISCRIMINATOR};

pub use crate::ids::{CharacterRef, LegacyId};

const PAIR_SEPARATOR: char = ';';
const KEY_VALUE_SEPARATOR: &str = "=>";

/// Splits a legacy string into trimmed `(key, value)` pairs.
///
/// Empty segments, segments without `=>` and segments with an empty key are
/// skipped.
///
/// # Examples
///
/// ```
/// use rphud_domain::legacy::parse_legacy_string;
///
/// let pairs = parse_legacy_string("name=>Bob; mood => grumpy;;junk");
/// assert_eq!(
///     pairs,
///     vec![
///         ("name".to_string(), "Bob".to_string()),
///         ("mood".to_string(), "grumpy".to_string()),
///     ]
/// );
/// ```
pub fn parse_legacy_string(raw: &str) -> Vec<(String, String)> {
    raw.split(PAIR_SEPARATOR)
        .filter_map(|segment| {
            let (key, value) = segment.split_once(KEY_VALUE_SEPARATOR)?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Maps a legacy string onto `template`.
///
/// Keys match template fields case-insensitively and values are coerced to
/// the type of the template default. Unknown keys are ignored. The result is
/// already in canonical order.
pub fn legacy_to_template(raw: &str, template: &Template) -> Map<String, Value> {
    let mut data = Map::new();
    for (key, value) in parse_legacy_string(raw) {
        let Some(field) = template.find_field(&key) else {
            continue;
        };
        let Some(default) = template.default_for(field) else {
            continue;
        };
        data.insert(field.to_string(), coerce_value(default, &value));
    }
    data.insert(
        DISCRIMINATOR.to_string(),
        Value::String(template.kind().name().to_string()),
    );

    // Discriminator was set from the template itself, reconciliation cannot fail.
    populate_and_order_fields(&data, template).unwrap_or_else(|_| template.defaults())
}
