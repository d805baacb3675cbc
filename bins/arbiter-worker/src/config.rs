// Language configuration management for the Arbiter worker
use anyhow::{bail, Context, Result};
use arbiter_common::types::{Language, LanguageEntry, LanguagesFile, SubmissionRejected};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Language -> execution-service id table, loaded from languages.json
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<String, LanguageEntry>,
}

impl LanguageConfigManager {
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;

        let languages: LanguagesFile =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        Self::from_entries(languages.languages)
    }

    pub fn from_entries(entries: Vec<LanguageEntry>) -> Result<Self> {
        let mut configs = HashMap::new();
        for entry in entries {
            let Some(language) = Language::from_str(&entry.name) else {
                bail!("Unknown language '{}' in languages.json", entry.name);
            };
            configs.insert(language.to_string(), entry);
        }
        if configs.is_empty() {
            bail!("No languages configured in languages.json");
        }
        Ok(Self { configs })
    }

    pub fn get_config(&self, language: &Language) -> Option<&LanguageEntry> {
        self.configs.get(&language.to_string())
    }

    /// Execution-service id for a language, or a rejection when the platform
    /// has no mapping for it. Checked before anything is dispatched.
    pub fn language_id(&self, language: &Language) -> Result<u32, SubmissionRejected> {
        self.get_config(language)
            .map(|entry| entry.language_id)
            .ok_or_else(|| SubmissionRejected::UnsupportedLanguage {
                language: language.to_string(),
            })
    }

    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: u32) -> LanguageEntry {
        LanguageEntry {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            language_id: id,
            file_extension: format!(".{}", name),
        }
    }

    #[test]
    fn test_load_repository_config() {
        let manager = LanguageConfigManager::load(Path::new("../../config/languages.json"))
            .expect("config/languages.json should parse");
        assert_eq!(manager.language_id(&Language::Cpp), Ok(54));
        assert_eq!(manager.language_id(&Language::Python), Ok(71));
        assert!(manager.list_languages().contains(&"java".to_string()));
    }

    #[test]
    fn test_unconfigured_language_is_rejected() {
        let manager = LanguageConfigManager::from_entries(vec![entry("python", 71)]).unwrap();
        assert_eq!(
            manager.language_id(&Language::Go),
            Err(SubmissionRejected::UnsupportedLanguage {
                language: "go".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_or_empty_config_fails() {
        assert!(LanguageConfigManager::from_entries(vec![entry("cobol", 1)]).is_err());
        assert!(LanguageConfigManager::from_entries(Vec::new()).is_err());
        assert!(LanguageConfigManager::load(Path::new("does/not/exist.json")).is_err());
    }
}
