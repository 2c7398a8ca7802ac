use crate::cli::{ConfigCommand, DirsCommand};
use anyhow::{anyhow, bail};
use label_config::{known_models, ConfigStore};
use serde_json::Value;

pub fn dirs(store: &ConfigStore, command: DirsCommand) -> anyhow::Result<()> {
    match command {
        DirsCommand::List => {
            let entries = store.directories();
            if entries.is_empty() {
                println!("no directories, add one with `labeler dirs add <path>`");
            }
            for entry in entries {
                let marker = if entry.has_custom_prompt() {
                    "custom prompt"
                } else {
                    "default prompt"
                };
                println!("{}  ({})", entry.path, marker);
            }
        }
        DirsCommand::Add { path, prompt } => {
            if store.add_directory(&path, prompt.as_deref())? {
                println!("added {}", path);
            } else {
                println!("{} is already in the list", path);
            }
        }
        DirsCommand::Remove { path } => {
            if store.remove_directory(&path)? {
                println!("removed {}", path);
            } else {
                bail!("{} is not in the list", path);
            }
        }
        DirsCommand::Prompt { path, text } => match text {
            Some(text) => {
                store.set_directory_prompt(&path, &text)?;
                if text.trim().is_empty() {
                    println!("prompt of {} reset to the default", path);
                } else {
                    println!("prompt of {} updated", path);
                }
            }
            None => {
                let prompt = store
                    .directory_prompt(&path)
                    .ok_or(anyhow!("{} is not in the list", path))?;
                println!("{}", prompt);
            }
        },
    }

    Ok(())
}

/// Values that parse as JSON keep their type, anything else is a string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// A hint when `value` is a model id the section does not list. Unlisted ids
/// are still accepted.
pub fn unknown_model_note(section: &str, key: &str, value: &Value) -> Option<String> {
    let models = known_models(section);
    let model = value.as_str()?;
    if key != "model" || models.is_empty() || models.contains(&model) {
        return None;
    }
    Some(format!(
        "note: {} is not a known {} model ({})",
        model,
        section,
        models.join(", ")
    ))
}

pub fn config(store: &ConfigStore, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show { section } => {
            let document = store.document();
            let value = match &section {
                Some(section) => document
                    .get(section)
                    .cloned()
                    .ok_or(anyhow!("no section {}", section))?,
                None => serde_json::to_value(&document)?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
            if let Some(models) = section.as_deref().map(known_models).filter(|v| !v.is_empty()) {
                println!("known models: {}", models.join(", "));
            }
        }
        ConfigCommand::Set {
            section,
            key,
            value,
        } => {
            let value = parse_value(&value);
            if let Some(note) = unknown_model_note(&section, &key, &value) {
                println!("{}", note);
            }
            store.set_value(&section, &key, value)?;
            println!("{}.{} updated", section, key);
        }
        ConfigCommand::SetZhipuKey { api_key } => {
            store.set_zhipu_api_key(api_key.trim())?;
            println!("zhipu key stored for captioning and translation");
        }
    }

    Ok(())
}
