//! Dialog menu formatter.
//!
//! The in-world dialog shows twelve buttons: nine content slots and three
//! pagination controls on the bottom row. A [`DialogMenu`] maps any ordered
//! option list onto that grid and resolves whatever the client echoes back.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::common::sanitize_label;

/// Content buttons per page.
pub const SLOTS_PER_PAGE: usize = 9;
/// Total buttons in the grid.
pub const GRID_SIZE: usize = 12;

pub const PREV_LABEL: &str = "<<";
pub const CANCEL_LABEL: &str = "Cancel";
pub const NEXT_LABEL: &str = ">>";
pub const EMPTY_LABEL: &str = "-";

pub const PREV_ACTION: &str = "menu:prev";
pub const CANCEL_ACTION: &str = "menu:cancel";
pub const NEXT_ACTION: &str = "menu:next";

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    pub label: String,
    pub action: String,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// A rendered content button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogButton {
    /// Zero-padded 1-based position in the full option list.
    pub token: String,
    pub label: String,
    pub action: String,
}

impl DialogButton {
    /// Text shown on the button.
    pub fn text(&self) -> String {
        format!("{} {}", self.token, self.label)
    }
}

/// One page of a paginated dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogMenu {
    pub page: usize,
    pub total_pages: usize,
    pub total_options: usize,
    pub buttons: Vec<DialogButton>,
}

impl DialogMenu {
    /// Builds page `page` (0-based, clamped) of `options`.
    ///
    /// With `dedupe`, options whose sanitized labels repeat are dropped,
    /// keeping the first occurrence.
    pub fn build(options: &[MenuOption], page: usize, dedupe: bool) -> Self {
        let mut seen = HashSet::new();
        let entries: Vec<(String, &str)> = options
            .iter()
            .map(|option| (sanitize_label(&option.label), option.action.as_str()))
            .filter(|(label, _)| !dedupe || seen.insert(label.clone()))
            .collect();

        let total_options = entries.len();
        let total_pages = total_options.div_ceil(SLOTS_PER_PAGE).max(1);
        let page = page.min(total_pages - 1);
        let width = token_width(total_options);

        let buttons = entries
            .into_iter()
            .enumerate()
            .skip(page * SLOTS_PER_PAGE)
            .take(SLOTS_PER_PAGE)
            .map(|(index, (label, action))| DialogButton {
                token: format!("{:0width$}", index + 1),
                label,
                action: action.to_string(),
            })
            .collect();

        Self {
            page,
            total_pages,
            total_options,
            buttons,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }

    /// The twelve button strings in the client's bottom-up order.
    ///
    /// The first three entries are the bottom row (the controls); content
    /// rows follow from the bottom up so the first option appears top left.
    pub fn remote_buttons(&self) -> Vec<String> {
        let mut slots: Vec<String> = self.buttons.iter().map(DialogButton::text).collect();
        slots.resize(SLOTS_PER_PAGE, EMPTY_LABEL.to_string());

        let mut out = Vec::with_capacity(GRID_SIZE);
        out.extend([PREV_LABEL, CANCEL_LABEL, NEXT_LABEL].map(str::to_string));
        for row in slots.chunks(3).rev() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Maps a reply from the client back to an action.
    ///
    /// Accepts the exact button text, a leading token, or the bare label.
    pub fn resolve(&self, reply: &str) -> Option<&str> {
        let reply = reply.trim();
        match reply {
            PREV_LABEL => return Some(PREV_ACTION),
            CANCEL_LABEL => return Some(CANCEL_ACTION),
            NEXT_LABEL => return Some(NEXT_ACTION),
            "" | EMPTY_LABEL => return None,
            _ => {}
        }

        if let Some(button) = self.buttons.iter().find(|b| b.text() == reply) {
            return Some(&button.action);
        }

        let leading = reply.split_whitespace().next().unwrap_or_default();
        if let Some(button) = self.buttons.iter().find(|b| b.token == leading) {
            return Some(&button.action);
        }

        let label = sanitize_label(reply);
        self.buttons
            .iter()
            .find(|b| b.label == label)
            .map(|b| b.action.as_str())
    }
}

fn token_width(total: usize) -> usize {
    let digits = total.max(1).ilog10() as usize + 1;
    digits.max(2)
}
