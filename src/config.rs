use leptos::prelude::*;
use serde::{Deserialize, Serialize};

/// Page-level configuration the server publishes through meta tags. The
/// settings dialog dispatches a `wiki-settings` CustomEvent with the same
/// shape as a JSON string when an admin changes them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiConfig {
    #[serde(default)]
    pub enable_link_embedding: bool,
    #[serde(default)]
    pub disable_content_max_width: bool,
}

impl WikiConfig {
    pub fn from_document() -> Self {
        Self {
            enable_link_embedding: meta_flag("enable-link-embedding"),
            disable_content_max_width: meta_flag("disable-content-max-width"),
        }
    }
}

fn meta_flag(name: &str) -> bool {
    document()
        .query_selector(&format!("meta[name=\"{name}\"]"))
        .ok()
        .flatten()
        .and_then(|el| el.get_attribute("content"))
        .is_some_and(|content| content == "true")
}
