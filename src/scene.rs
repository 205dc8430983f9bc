use serde::{Deserialize, Serialize};

use crate::error::{ReelError, ReelResult};

/// One narrated beat of the script: the sentence spoken over it and an
/// optional explicit visual search term chosen by the script source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
}

impl Scene {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            search_term: None,
        }
    }

    pub fn with_search_term(text: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            search_term: Some(term.into()),
        }
    }

    /// Accept a scene in either upstream shape: a bare string, or an object
    /// with `text` and optional `search_term`. Script generators are not
    /// consistent about which they emit.
    pub fn from_value(value: &serde_json::Value) -> ReelResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Self::new(s.clone())),
            serde_json::Value::Object(map) => {
                let text = map
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ReelError::validation("scene object is missing 'text'"))?;
                let search_term = map
                    .get("search_term")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_owned);
                Ok(Self {
                    text: text.to_owned(),
                    search_term,
                })
            }
            other => Err(ReelError::validation(format!(
                "scene must be a string or object, got {other}"
            ))),
        }
    }

    /// Parse a whole script's scene list, rejecting empty scripts.
    pub fn parse_script(value: &serde_json::Value) -> ReelResult<Vec<Scene>> {
        let items = value
            .as_array()
            .ok_or_else(|| ReelError::validation("script scenes must be an array"))?;
        let scenes: Vec<Scene> = items
            .iter()
            .map(Scene::from_value)
            .collect::<ReelResult<_>>()?;
        if scenes.iter().all(|s| s.text.trim().is_empty()) {
            return Err(ReelError::validation("script contains no narratable text"));
        }
        Ok(scenes)
    }
}
