//! `KEY=VALUE` line parsing

use std::collections::HashMap;

/// Parsed key/value pairs. The first occurrence of a key wins.
#[derive(Debug, Default)]
pub struct KeyValues {
    entries: HashMap<String, String>,
}

impl KeyValues {
    /// Parse config text. Blank lines, `#` comments, and lines without `=`
    /// are ignored.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            entries
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }
        Self { entries }
    }

    /// Value of `key`, treating empty values as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_wins() {
        let kv = KeyValues::parse("A=1\nA=2\n");
        assert_eq!(kv.get("A"), Some("1"));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let kv = KeyValues::parse("# comment\n\n  B = two words \r\nnoequals\n");
        assert_eq!(kv.get("B"), Some("two words"));
        assert_eq!(kv.get("noequals"), None);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let kv = KeyValues::parse("URL=https://host/repo?x=1\n");
        assert_eq!(kv.get("URL"), Some("https://host/repo?x=1"));
    }

    #[test]
    fn test_empty_value_is_absent() {
        let kv = KeyValues::parse("EMPTY=\n");
        assert_eq!(kv.get("EMPTY"), None);
    }
}
