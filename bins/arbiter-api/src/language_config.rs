// Language configuration management
// Loads and validates languages from languages.json

use arbiter_common::types::{Language, LanguagesFile, SubmissionRejected};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Registry of configured languages
/// This is the authoritative source for which languages the API will queue
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    enabled_languages: HashSet<Language>,
}

impl LanguageRegistry {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read languages.json: {}", e))?;

        let config: LanguagesFile = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse languages.json: {}", e))?;

        let names: Vec<&str> = config.languages.iter().map(|l| l.name.as_str()).collect();
        Self::from_names(&names)
    }

    pub fn from_names(names: &[&str]) -> Result<Self, String> {
        let mut enabled_languages = HashSet::new();

        for name in names {
            match Language::from_str(name) {
                Some(lang) => {
                    enabled_languages.insert(lang);
                }
                None => {
                    return Err(format!("Unknown language '{}' in languages.json", name));
                }
            }
        }

        if enabled_languages.is_empty() {
            return Err("No languages configured in languages.json".to_string());
        }

        Ok(Self { enabled_languages })
    }

    pub fn is_enabled(&self, language: Language) -> bool {
        self.enabled_languages.contains(&language)
    }

    pub fn check(&self, language: Language) -> Result<(), SubmissionRejected> {
        if self.is_enabled(language) {
            Ok(())
        } else {
            Err(SubmissionRejected::UnsupportedLanguage {
                language: language.to_string(),
            })
        }
    }

    pub fn enabled_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.enabled_languages.iter().copied().collect();
        languages.sort_by_key(|l| l.to_string());
        languages
    }
}
