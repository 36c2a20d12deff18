//! YAML loading with readable errors

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Strip a leading `---` document separator and surrounding whitespace
pub fn clean_yaml(yaml: &str) -> String {
    yaml.trim_start().trim_start_matches("---").trim().to_string()
}

/// Parse YAML into a typed structure; `source` names the input in errors
pub fn parse_yaml<T: DeserializeOwned>(yaml: &str, source: &str) -> Result<T> {
    let cleaned = clean_yaml(yaml);
    serde_yaml::from_str(&cleaned).map_err(|e| {
        let hint = if e.to_string().contains("duplicate") {
            " (duplicate keys are not allowed)"
        } else {
            ""
        };
        match e.location() {
            Some(loc) => anyhow::anyhow!(
                "{}:{}:{}: {}{}",
                source,
                loc.line(),
                loc.column(),
                e,
                hint
            ),
            None => anyhow::anyhow!("{}: {}{}", source, e, hint),
        }
    })
}

/// Read and parse a YAML file; an empty document yields `None`
pub fn load_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if clean_yaml(&text).is_empty() {
        return Ok(None);
    }
    parse_yaml(&text, &path.display().to_string()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_yaml_with_separator() {
        let parsed: BTreeMap<String, String> =
            parse_yaml("---\nidock: /opt/idock/bin/idock\n", "tools.yaml").unwrap();
        assert_eq!(parsed["idock"], "/opt/idock/bin/idock");
    }

    #[test]
    fn test_parse_yaml_error_names_source() {
        let err = parse_yaml::<BTreeMap<String, String>>("idock: [unclosed", "tools.yaml")
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("tools.yaml"), "{}", err);
    }

    #[test]
    fn test_load_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.yaml");
        std::fs::write(&path, "---\n").unwrap();
        assert_eq!(load_yaml_file::<BTreeMap<String, String>>(&path).unwrap(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_yaml_file::<BTreeMap<String, String>>(&dir.path().join("nope.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("failed to read"));
    }
}
