use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, HonyakuError};

/// Term dictionary, sorted once by descending key length so longer terms win.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<(String, String)>,
}

/// Terms found in one text, in the order they were matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictionaryMatches {
    entries: Vec<(String, String)>,
}

impl Dictionary {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .filter(|(key, _)| !key.is_empty())
            .collect();
        entries.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });
        Self { entries }
    }

    /// Load a JSON object of `"term": "translation"` pairs.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HonyakuError::Dictionary(format!("Failed to read {}: {}", path.display(), e)))?;

        let raw: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            HonyakuError::Dictionary(format!(
                "{} is not a JSON object of string terms: {}",
                path.display(),
                e
            ))
        })?;

        let dictionary = Self::new(raw);
        debug!("Loaded {} dictionary entries from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect the terms present in `text`. Each matched term is cut out of a
    /// scratch copy before shorter terms are tried, so a term nested inside a
    /// longer match is not reported again.
    pub fn match_against(&self, text: &str) -> DictionaryMatches {
        let mut matches = DictionaryMatches::default();
        let mut remaining = text.to_string();

        for (key, value) in &self.entries {
            if remaining.is_empty() {
                break;
            }
            if remaining.contains(key.as_str()) {
                matches.entries.push((key.clone(), value.clone()));
                remaining = remaining.replace(key.as_str(), "");
            }
        }

        matches
    }
}

impl DictionaryMatches {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders as `{'term': 'translation', ...}`, the shape the prompt refers to.
impl fmt::Display for DictionaryMatches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': '{}'", quote(key), quote(value))?;
        }
        f.write_str("}")
    }
}

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dictionary(pairs: &[(&str, &str)]) -> Dictionary {
        Dictionary::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_longest_term_consumes_shorter_one() {
        let dict = dictionary(&[("技能", "Skill"), ("技能描述", "Skill Desc")]);
        let matches = dict.match_against("这里是技能描述。");
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![("技能描述", "Skill Desc")]);
    }

    #[test]
    fn test_shorter_term_still_matches_elsewhere() {
        let dict = dictionary(&[("技能", "Skill"), ("技能描述", "Skill Desc")]);
        let matches = dict.match_against("技能描述与技能");
        assert_eq!(
            matches.iter().collect::<Vec<_>>(),
            vec![("技能描述", "Skill Desc"), ("技能", "Skill")]
        );
    }

    #[test]
    fn test_no_match_is_empty() {
        let dict = dictionary(&[("勇者", "Hero")]);
        let matches = dict.match_against("魔王");
        assert!(matches.is_empty());
        assert_eq!(matches.to_string(), "{}");
    }

    #[test]
    fn test_stops_once_text_is_consumed() {
        let dict = dictionary(&[("アリス", "爱丽丝"), ("ス", "斯")]);
        let matches = dict.match_against("アリス");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_empty_keys_are_dropped() {
        let dict = dictionary(&[("", "nothing"), ("剣", "剑")]);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_render_matches() {
        let dict = dictionary(&[("勇者", "Hero"), ("魔王's", "Demon King")]);
        let matches = dict.match_against("勇者と魔王's城");
        assert_eq!(matches.to_string(), "{'魔王\\'s': 'Demon King', '勇者': 'Hero'}");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ポーション": "药水", "ハイポーション": "高级药水"}}"#).unwrap();

        let dict = Dictionary::from_file(file.path()).unwrap();
        assert_eq!(dict.len(), 2);
        let matches = dict.match_against("ハイポーションを使った");
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![("ハイポーション", "高级药水")]);
    }

    #[test]
    fn test_load_rejects_non_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["not", "a", "map"]"#).unwrap();

        let err = Dictionary::from_file(file.path()).unwrap_err();
        assert!(matches!(err, HonyakuError::Dictionary(_)));
    }
}
