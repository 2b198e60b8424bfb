use rphud_domain::{CharacterId, TemplateKind};
use serde::Serialize;
use serde_json::{Map, Value};

/// A reconciled character as returned to the in-world client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterView {
    pub character_id: CharacterId,
    pub character_name: String,
    /// Positive legacy id for imported characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<u64>,
    pub titler: Map<String, Value>,
    pub settings: Map<String, Value>,
    pub stats: Map<String, Value>,
    /// Viewer code for `settings.attach_point`.
    pub attach_point: i64,
}

impl CharacterView {
    pub fn blob(&self, kind: TemplateKind) -> &Map<String, Value> {
        match kind {
            TemplateKind::Titler => &self.titler,
            TemplateKind::Settings => &self.settings,
            TemplateKind::Stats => &self.stats,
        }
    }

    pub(crate) fn blob_mut(&mut self, kind: TemplateKind) -> &mut Map<String, Value> {
        match kind {
            TemplateKind::Titler => &mut self.titler,
            TemplateKind::Settings => &mut self.settings,
            TemplateKind::Stats => &mut self.stats,
        }
    }
}
