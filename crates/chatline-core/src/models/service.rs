use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend pipeline a prompt is routed to. The chat input offers mutually
/// exclusive toggles; holding them as one value makes "at most one active"
/// structural.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSelector {
    #[default]
    Default,
    WebSearch,
    Thinking,
    ImageSearch,
    NewsSearch,
}

impl ServiceSelector {
    pub const ALL: [ServiceSelector; 5] = [
        Self::Default,
        Self::WebSearch,
        Self::Thinking,
        Self::ImageSearch,
        Self::NewsSearch,
    ];

    /// Value sent as `service_name`.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Default => "chat",
            Self::WebSearch => "web_search",
            Self::Thinking => "thinking",
            Self::ImageSearch => "image_search",
            Self::NewsSearch => "news_search",
        }
    }

    /// Press a toggle: selects `toggle`, or goes back to `Default` when it
    /// was already the selected one.
    pub fn toggle(self, toggle: ServiceSelector) -> ServiceSelector {
        if self == toggle {
            Self::Default
        } else {
            toggle
        }
    }
}

impl fmt::Display for ServiceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

impl FromStr for ServiceSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if normalized == "default" {
            return Ok(Self::Default);
        }
        Self::ALL
            .into_iter()
            .find(|sel| sel.service_name() == normalized)
            .ok_or_else(|| format!("unknown service '{}'", s))
    }
}

/// Per-send choices made in the chat input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub service: ServiceSelector,
}

impl SendOptions {
    pub fn with_service(service: ServiceSelector) -> Self {
        Self { service }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_selects_and_clears() {
        let sel = ServiceSelector::Default.toggle(ServiceSelector::WebSearch);
        assert_eq!(sel, ServiceSelector::WebSearch);

        // Selecting another toggle replaces the first one.
        let sel = sel.toggle(ServiceSelector::Thinking);
        assert_eq!(sel, ServiceSelector::Thinking);

        // Pressing the active toggle again clears it.
        assert_eq!(sel.toggle(ServiceSelector::Thinking), ServiceSelector::Default);
    }

    #[test]
    fn test_service_names() {
        assert_eq!(ServiceSelector::Default.service_name(), "chat");
        assert_eq!(ServiceSelector::NewsSearch.to_string(), "news_search");
    }

    #[test]
    fn test_parse() {
        assert_eq!("web-search".parse::<ServiceSelector>(), Ok(ServiceSelector::WebSearch));
        assert_eq!("chat".parse::<ServiceSelector>(), Ok(ServiceSelector::Default));
        assert_eq!("default".parse::<ServiceSelector>(), Ok(ServiceSelector::Default));
        assert!("video".parse::<ServiceSelector>().is_err());
    }
}
