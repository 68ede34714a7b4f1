//! Context settings, JSON-loadable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name given to the fixed UI runtime.
    pub ui_runtime_name: String,
    /// Name given to the main (application) runtime.
    pub main_runtime_name: String,
    /// Whether layout animations start enabled.
    pub layout_animations_enabled: bool,
    /// Host-configured layout-relevant prop names, merged with the built-in
    /// allow-list.
    pub layout_props: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ui_runtime_name: "ui".to_string(),
            main_runtime_name: "main".to_string(),
            layout_animations_enabled: false,
            layout_props: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings = Settings::from_json(r#"{"layout_animations_enabled": true}"#).unwrap();
        assert_eq!(settings.ui_runtime_name, "ui");
        assert!(settings.layout_animations_enabled);
        assert!(settings.layout_props.is_empty());
    }

    #[test]
    fn test_configured_layout_props_parse() {
        let settings =
            Settings::from_json(r#"{"layout_props": ["shadowRadius", "borderWidth"]}"#).unwrap();
        assert_eq!(settings.layout_props.len(), 2);
    }
}
