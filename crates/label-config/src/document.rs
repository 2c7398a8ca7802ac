use crate::{
    defaults::DEFAULT_PROMPT,
    sections::{
        ConfigSection, GeminiConfig, LabelingConfig, LocalModelConfig, TranslationConfig,
        ZhipuLabelConfig, ZhipuTranslateConfig,
    },
    ConfigError, ConfigResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub(crate) const DIRECTORIES_KEY: &str = "directories";
/// Older documents kept per-directory prompts in a separate path -> prompt map.
pub(crate) const LEGACY_DIRECTORY_PROMPTS_KEY: &str = "directory_prompts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: String,
    pub prompt: String,
}

impl DirectoryEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    /// Whether the prompt was customised for this directory.
    pub fn has_custom_prompt(&self) -> bool {
        self.prompt != DEFAULT_PROMPT
    }
}

/// The whole persisted configuration: a directory list plus one sub-mapping
/// per backend. Unknown keys survive a load/save cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Compiled defaults for every backend and an empty directory list.
    pub fn seeded() -> Self {
        let mut doc = Self::default();
        doc.0
            .insert(DIRECTORIES_KEY.to_string(), Value::Array(vec![]));
        doc.seed_section::<GeminiConfig>();
        doc.seed_section::<ZhipuLabelConfig>();
        doc.seed_section::<ZhipuTranslateConfig>();
        doc.seed_section::<LocalModelConfig>();
        doc.seed_section::<TranslationConfig>();
        doc.seed_section::<LabelingConfig>();
        doc
    }

    fn seed_section<T: ConfigSection>(&mut self) {
        if let Ok(value) = serde_json::to_value(T::default()) {
            self.0.insert(T::KEY.to_string(), value);
        }
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    fn default_fields<T: ConfigSection>() -> ConfigResult<Map<String, Value>> {
        match serde_json::to_value(T::default())? {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    fn saved_fields(&self, key: &str) -> Option<&Map<String, Value>> {
        match self.0.get(key) {
            Some(Value::Object(saved)) => Some(saved),
            Some(other) => {
                tracing::warn!("config section {} is not an object: {}", key, other);
                None
            }
            None => None,
        }
    }

    /// Saved keys of the section laid over its compiled default. Fails when
    /// any saved key does not fit its field.
    pub fn try_section<T: ConfigSection>(&self) -> ConfigResult<T> {
        let mut merged = Self::default_fields::<T>()?;
        if let Some(saved) = self.saved_fields(T::KEY) {
            merged.extend(saved.clone());
        }
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Like [`Document::try_section`], but a saved key that does not fit its
    /// field falls back to that field's default while the other saved keys
    /// still apply.
    pub fn section<T: ConfigSection>(&self) -> T {
        let e = match self.try_section::<T>() {
            Ok(section) => return section,
            Err(e) => e,
        };
        tracing::warn!("config section {} has invalid values: {}", T::KEY, e);

        let Ok(mut merged) = Self::default_fields::<T>() else {
            return T::default();
        };
        if let Some(saved) = self.saved_fields(T::KEY) {
            for (key, value) in saved {
                let mut candidate = merged.clone();
                candidate.insert(key.clone(), value.clone());
                if serde_json::from_value::<T>(Value::Object(candidate.clone())).is_ok() {
                    merged = candidate;
                } else {
                    tracing::warn!("ignoring invalid value of {}.{}: {}", T::KEY, key, value);
                }
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Replaces the known keys of a section, keeping any extra keys found in
    /// the saved sub-mapping.
    pub fn set_section<T: ConfigSection>(&mut self, section: &T) -> ConfigResult<()> {
        let value = serde_json::to_value(section)?;
        let Value::Object(fields) = value else {
            return Err(ConfigError::NotAnObject);
        };

        let entry = self
            .0
            .entry(T::KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(saved) = entry {
            for (key, value) in fields {
                saved.insert(key, value);
            }
        }

        Ok(())
    }

    /// Canonical directory entries, and whether any legacy shape had to be
    /// upgraded to produce them.
    pub fn directories(&self) -> (Vec<DirectoryEntry>, bool) {
        let items = match self.0.get(DIRECTORIES_KEY) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                tracing::warn!("directories is not a list, ignoring it: {}", other);
                return (vec![], true);
            }
            None => return (vec![], false),
        };

        let legacy_prompts = self.0.get(LEGACY_DIRECTORY_PROMPTS_KEY).and_then(|v| v.as_object());
        let legacy_prompt_for = |path: &str| -> String {
            legacy_prompts
                .and_then(|prompts| prompts.get(path))
                .and_then(|v| v.as_str())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(DEFAULT_PROMPT)
                .to_string()
        };

        let mut upgraded = legacy_prompts.is_some();
        let mut seen = HashSet::new();
        let mut entries = vec![];

        for item in items {
            let entry = match item {
                Value::String(path) => {
                    upgraded = true;
                    DirectoryEntry {
                        path: path.clone(),
                        prompt: legacy_prompt_for(path),
                    }
                }
                Value::Object(fields) => {
                    let Some(path) = fields.get("path").and_then(|v| v.as_str()) else {
                        upgraded = true;
                        continue;
                    };
                    let prompt = match fields.get("prompt").and_then(|v| v.as_str()) {
                        Some(prompt) if !prompt.trim().is_empty() => prompt.to_string(),
                        _ => {
                            upgraded = true;
                            legacy_prompt_for(path)
                        }
                    };
                    DirectoryEntry {
                        path: path.to_string(),
                        prompt,
                    }
                }
                _ => {
                    upgraded = true;
                    continue;
                }
            };

            if seen.insert(entry.path.clone()) {
                entries.push(entry);
            } else {
                upgraded = true;
            }
        }

        (entries, upgraded)
    }

    /// Writes the canonical directory list and drops the legacy prompt map.
    pub fn set_directories(&mut self, entries: &[DirectoryEntry]) -> ConfigResult<()> {
        let value = serde_json::to_value(entries)?;
        self.0.insert(DIRECTORIES_KEY.to_string(), value);
        self.0.remove(LEGACY_DIRECTORY_PROMPTS_KEY);
        Ok(())
    }
}
