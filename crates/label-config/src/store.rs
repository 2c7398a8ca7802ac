use crate::{
    defaults::APP_DIR_NAME,
    document::{DirectoryEntry, Document},
    sections::{
        ConfigSection, GeminiConfig, LabelingConfig, LocalModelConfig, TranslationConfig,
        ZhipuLabelConfig, ZhipuTranslateConfig, SECTION_KEYS,
    },
    ConfigError, ConfigResult,
};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, error, info, warn};

pub const CONFIG_FILE_NAME: &str = "data.json";

/// Owns the on-disk configuration document and an in-memory copy of it.
///
/// Reads never touch the disk; every setter writes the whole document back
/// before updating the cached copy, so a failed write leaves the cache as it
/// was.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    document: RwLock<Document>,
}

impl ConfigStore {
    /// `$CONFIG_DIR/image-labeler/data.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = Self::load(&path);
        Self {
            path,
            document: RwLock::new(document),
        }
    }

    /// Reads the document at `path`. A missing file gives the seeded default
    /// document; an unreadable or malformed one is logged and does the same.
    pub fn load(path: impl AsRef<Path>) -> Document {
        let path = path.as_ref();
        if !path.exists() {
            debug!("config file {} not found, using defaults", path.display());
            return Document::seeded();
        }

        match Self::read_document(path) {
            Ok(document) => document,
            Err(e) => {
                error!("failed to load config file {}: {}", path.display(), e);
                Document::seeded()
            }
        }
    }

    fn read_document(path: &Path) -> ConfigResult<Document> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        Document::from_value(value)
    }

    fn write_document(&self, document: &Document) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(document)?;
        let temp_path = self.path.with_extension("json.temp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the backing file, replacing the cached document.
    pub fn reload(&self) {
        let document = Self::load(&self.path);
        *self.write_lock() = document;
    }

    /// Persists `document` and makes it the cached copy. Returns `false`
    /// (after logging) if the file could not be written.
    pub fn save(&self, document: Document) -> bool {
        match self.write_document(&document) {
            Ok(()) => {
                *self.write_lock() = document;
                true
            }
            Err(e) => {
                error!("failed to save config file {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn document(&self) -> Document {
        self.read_lock().clone()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write().unwrap_or_else(|e| e.into_inner())
    }

    fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Document) -> ConfigResult<()>,
    {
        let mut document = self.write_lock();
        let mut updated = document.clone();
        f(&mut updated)?;
        self.write_document(&updated)?;
        *document = updated;
        Ok(())
    }

    pub fn section<T: ConfigSection>(&self) -> T {
        self.read_lock().section::<T>()
    }

    pub fn set_section<T: ConfigSection>(&self, section: &T) -> ConfigResult<()> {
        self.update(|doc| doc.set_section(section))
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        self.section()
    }

    pub fn set_gemini_config(&self, config: &GeminiConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    pub fn zhipu_label_config(&self) -> ZhipuLabelConfig {
        self.section()
    }

    pub fn set_zhipu_label_config(&self, config: &ZhipuLabelConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    pub fn zhipu_translate_config(&self) -> ZhipuTranslateConfig {
        self.section()
    }

    pub fn set_zhipu_translate_config(&self, config: &ZhipuTranslateConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    /// Captioning and translation through Zhipu share one credential.
    pub fn set_zhipu_api_key(&self, api_key: &str) -> ConfigResult<()> {
        self.update(|doc| {
            let mut label = doc.section::<ZhipuLabelConfig>();
            label.api_key = api_key.to_string();
            doc.set_section(&label)?;

            let mut translate = doc.section::<ZhipuTranslateConfig>();
            translate.api_key = api_key.to_string();
            doc.set_section(&translate)
        })
    }

    pub fn local_config(&self) -> LocalModelConfig {
        self.section()
    }

    pub fn set_local_config(&self, config: &LocalModelConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    pub fn translation_config(&self) -> TranslationConfig {
        self.section()
    }

    pub fn set_translation_config(&self, config: &TranslationConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    pub fn labeling_config(&self) -> LabelingConfig {
        self.section()
    }

    pub fn set_labeling_config(&self, config: &LabelingConfig) -> ConfigResult<()> {
        self.set_section(config)
    }

    /// Sets one key of a section by name. The merged section must still
    /// deserialize, otherwise nothing is written.
    pub fn set_value(&self, section: &str, key: &str, value: Value) -> ConfigResult<()> {
        if !SECTION_KEYS.contains(&section) {
            return Err(ConfigError::UnknownSection(section.to_string()));
        }

        self.update(|doc| {
            let mut fields = match doc.get(section) {
                Some(Value::Object(fields)) => fields.clone(),
                _ => serde_json::Map::new(),
            };
            fields.insert(key.to_string(), value);

            let mut probe = doc.clone();
            probe.insert(section, Value::Object(fields.clone()));
            validate_section(&probe, section)?;

            doc.insert(section, Value::Object(fields));
            Ok(())
        })
    }

    /// The directory list in canonical shape. Legacy shapes found in the
    /// document are upgraded and written back.
    pub fn directories(&self) -> Vec<DirectoryEntry> {
        let (entries, upgraded) = self.read_lock().directories();
        if upgraded {
            info!("upgrading legacy directory entries in {}", self.path.display());
            if let Err(e) = self.update(|doc| doc.set_directories(&entries)) {
                warn!("failed to persist upgraded directory entries: {}", e);
            }
        }
        entries
    }

    pub fn set_directories(&self, entries: &[DirectoryEntry]) -> ConfigResult<()> {
        self.update(|doc| doc.set_directories(entries))
    }

    /// Registers a directory under its normalised path; re-adding a known
    /// path is a no-op that returns `false`.
    pub fn add_directory(&self, path: &str, prompt: Option<&str>) -> ConfigResult<bool> {
        let mut entries = self.directories();
        if find_directory(&entries, path).is_some() {
            return Ok(false);
        }

        let mut entry = DirectoryEntry::new(normalize_directory(path));
        if let Some(prompt) = prompt.filter(|v| !v.trim().is_empty()) {
            entry.prompt = prompt.to_string();
        }
        entries.push(entry);
        self.set_directories(&entries)?;
        Ok(true)
    }

    pub fn remove_directory(&self, path: &str) -> ConfigResult<bool> {
        let mut entries = self.directories();
        let Some(index) = find_directory(&entries, path) else {
            return Ok(false);
        };
        entries.remove(index);
        self.set_directories(&entries)?;
        Ok(true)
    }

    pub fn directory_entry(&self, path: &str) -> Option<DirectoryEntry> {
        let mut entries = self.directories();
        find_directory(&entries, path).map(|index| entries.swap_remove(index))
    }

    pub fn directory_prompt(&self, path: &str) -> Option<String> {
        self.directory_entry(path).map(|v| v.prompt)
    }

    /// An empty prompt resets the directory to the default instruction.
    pub fn set_directory_prompt(&self, path: &str, prompt: &str) -> ConfigResult<()> {
        let mut entries = self.directories();
        let index = find_directory(&entries, path)
            .ok_or_else(|| ConfigError::UnknownDirectory(path.to_string()))?;

        let entry = &mut entries[index];
        entry.prompt = if prompt.trim().is_empty() {
            DirectoryEntry::new(path).prompt
        } else {
            prompt.to_string()
        };
        self.set_directories(&entries)
    }
}

/// Absolute path of an existing directory with symlinks resolved. Paths that
/// cannot be resolved only lose trailing separators.
pub fn normalize_directory(path: &str) -> String {
    match std::fs::canonicalize(path) {
        Ok(v) => v.to_string_lossy().to_string(),
        Err(_) => match path.trim_end_matches(['/', '\\']) {
            "" => path.to_string(),
            trimmed => trimmed.to_string(),
        },
    }
}

/// Entries saved by older versions may hold unnormalised paths, so both
/// sides are normalised before comparing.
fn find_directory(entries: &[DirectoryEntry], path: &str) -> Option<usize> {
    let wanted = normalize_directory(path);
    entries
        .iter()
        .position(|v| v.path == path || normalize_directory(&v.path) == wanted)
}

fn validate_section(doc: &Document, section: &str) -> ConfigResult<()> {
    match section {
        GeminiConfig::KEY => doc.try_section::<GeminiConfig>().map(|_| ()),
        ZhipuLabelConfig::KEY => doc.try_section::<ZhipuLabelConfig>().map(|_| ()),
        ZhipuTranslateConfig::KEY => doc.try_section::<ZhipuTranslateConfig>().map(|_| ()),
        LocalModelConfig::KEY => doc.try_section::<LocalModelConfig>().map(|_| ()),
        TranslationConfig::KEY => doc.try_section::<TranslationConfig>().map(|_| ()),
        LabelingConfig::KEY => doc.try_section::<LabelingConfig>().map(|_| ()),
        other => Err(ConfigError::UnknownSection(other.to_string())),
    }
}
