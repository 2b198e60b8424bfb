//! Canonical character templates and field reconciliation.
//!
//! Every template-shaped JSON blob carries a `template` discriminator as its
//! last key. Stored blobs are reconciled against their canonical template on
//! each load: missing fields are filled from defaults, unknown fields are
//! dropped, and keys are re-emitted in canonical order.

use serde_json::{Map, Value};

use crate::error::DomainError;

/// Key holding the template discriminator.
pub const DISCRIMINATOR: &str = "template";

/// The three canonical templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Role-play display fields shown over the avatar.
    Titler,
    /// HUD appearance and AFK/OOC flags.
    Settings,
    /// Character statistics.
    Stats,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [Self::Titler, Self::Settings, Self::Stats];

    /// Value of the `template` discriminator.
    pub fn name(self) -> &'static str {
        match self {
            Self::Titler => "character",
            Self::Settings => "settings",
            Self::Stats => "stats",
        }
    }

    /// Column of `player_characters` holding this template.
    pub fn column(self) -> &'static str {
        match self {
            Self::Titler => "character_titler",
            Self::Settings => "character_options",
            Self::Stats => "character_stats",
        }
    }

    /// Accepts the discriminator or the common aliases used by in-world scripts.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" | "titler" => Some(Self::Titler),
            "settings" | "options" => Some(Self::Settings),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

/// A validated canonical template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    kind: TemplateKind,
    fields: Map<String, Value>,
}

impl Template {
    /// Validates the discriminator and moves it to the last position.
    pub fn new(kind: TemplateKind, mut fields: Map<String, Value>) -> Result<Self, DomainError> {
        let found = fields
            .get(DISCRIMINATOR)
            .and_then(Value::as_str)
            .map(str::to_string);
        if found.as_deref() != Some(kind.name()) {
            return Err(DomainError::template_mismatch(Some(kind.name()), found.as_deref()));
        }

        fields.shift_remove(DISCRIMINATOR);
        if fields.is_empty() {
            return Err(DomainError::invalid_template(format!(
                "template {} defines no fields",
                kind.name()
            )));
        }
        fields.insert(DISCRIMINATOR.to_string(), Value::String(kind.name().to_string()));

        Ok(Self { kind, fields })
    }

    /// Parses a template from its JSON text.
    pub fn from_json(kind: TemplateKind, raw: &str) -> Result<Self, DomainError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => Self::new(kind, fields),
            Ok(_) => Err(DomainError::invalid_template(format!(
                "template {} is not a JSON object",
                kind.name()
            ))),
            Err(e) => Err(DomainError::invalid_template(format!(
                "template {} is not valid JSON: {e}",
                kind.name()
            ))),
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Canonical fields including the trailing discriminator.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Field names in canonical order, without the discriminator.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|k| *k != DISCRIMINATOR)
    }

    pub fn default_for(&self, field: &str) -> Option<&Value> {
        if field == DISCRIMINATOR {
            return None;
        }
        self.fields.get(field)
    }

    /// Canonical spelling of `name`, matched case-insensitively.
    pub fn find_field(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.field_names().find(|k| k.eq_ignore_ascii_case(name))
    }

    /// A fresh copy of the defaults.
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields.clone()
    }
}

/// Reconciles `data` against `template`.
///
/// Both must carry the same discriminator. The result holds exactly the
/// template's keys in canonical order, with `template` last.
pub fn populate_and_order_fields(
    data: &Map<String, Value>,
    template: &Template,
) -> Result<Map<String, Value>, DomainError> {
    let expected = template.kind().name();
    let found = data.get(DISCRIMINATOR).and_then(Value::as_str);
    if found != Some(expected) {
        return Err(DomainError::template_mismatch(Some(expected), found));
    }

    let mut out = Map::with_capacity(template.fields().len());
    for (key, default) in template.fields() {
        if key == DISCRIMINATOR {
            continue;
        }
        let value = data.get(key).cloned().unwrap_or_else(|| default.clone());
        out.insert(key.clone(), value);
    }
    out.insert(DISCRIMINATOR.to_string(), Value::String(expected.to_string()));
    Ok(out)
}

/// Result of reconciling a stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub fields: Map<String, Value>,
    /// True when the key sequence differs and the blob must be re-persisted.
    pub changed: bool,
}

/// Like [`populate_and_order_fields`], also reporting whether the stored key
/// sequence changed.
pub fn reconcile(
    data: &Map<String, Value>,
    template: &Template,
) -> Result<Reconciled, DomainError> {
    let fields = populate_and_order_fields(data, template)?;
    let changed = !data.keys().eq(fields.keys());
    Ok(Reconciled { fields, changed })
}

/// Converts raw text into the JSON type of `default`.
///
/// Unparseable numbers fall back to the default value.
pub fn coerce_value(default: &Value, raw: &str) -> Value {
    let raw = raw.trim();
    match default {
        Value::Bool(fallback) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Value::Bool(true),
            "0" | "false" | "no" | "off" | "" => Value::Bool(false),
            _ => Value::Bool(*fallback),
        },
        Value::Number(n) if n.is_f64() => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| default.clone()),
        Value::Number(_) => {
            if let Ok(int) = raw.parse::<i64>() {
                Value::from(int)
            } else {
                raw.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| default.clone())
            }
        }
        _ => Value::String(raw.to_string()),
    }
}

/// The canonical templates, one per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    titler: Template,
    settings: Template,
    stats: Template,
}

impl TemplateSet {
    pub fn new(titler: Template, settings: Template, stats: Template) -> Result<Self, DomainError> {
        for (template, kind) in [
            (&titler, TemplateKind::Titler),
            (&settings, TemplateKind::Settings),
            (&stats, TemplateKind::Stats),
        ] {
            if template.kind() != kind {
                return Err(DomainError::template_mismatch(
                    Some(kind.name()),
                    Some(template.kind().name()),
                ));
            }
        }
        Ok(Self {
            titler,
            settings,
            stats,
        })
    }

    pub fn get(&self, kind: TemplateKind) -> &Template {
        match kind {
            TemplateKind::Titler => &self.titler,
            TemplateKind::Settings => &self.settings,
            TemplateKind::Stats => &self.stats,
        }
    }
}
