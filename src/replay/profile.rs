use crate::errors::{ReplayError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Flat, canonical key -> value view of a persona.
///
/// Whatever shape the source JSON had (`{data:{...}}` wrappers, nested
/// address objects, numbers), everything past this boundary sees strings
/// keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: Option<String>,
    values: BTreeMap<String, String>,
}

impl Profile {
    pub fn from_value(value: &Value) -> Self {
        let mut values = BTreeMap::new();
        if let Value::Object(map) = value {
            flatten_into(map, &mut values);
        }

        let mut profile = Self {
            name: value
                .get("profileName")
                .or_else(|| value.get("profile_name"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            values,
        };
        profile.derive_fields();
        profile
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::ProfileLoad(format!("{}: {}", path.display(), e)))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ReplayError::ProfileLoad(format!("{}: {}", path.display(), e)))?;
        if !value.is_object() {
            return Err(ReplayError::ProfileLoad(format!(
                "{}: profile must be a JSON object",
                path.display()
            )));
        }

        let mut profile = Self::from_value(&value);
        if profile.name.is_none() {
            profile.name = path.file_stem().map(|s| s.to_string_lossy().to_string());
        }
        debug!(profile = ?profile.name, fields = profile.len(), "loaded profile");
        Ok(profile)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Case-insensitive lookup ignoring `-`, `_` and spaces.
    pub fn get_loose(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let wanted = compact(key);
        self.values
            .iter()
            .find(|(k, v)| compact(k) == wanted && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn derive_fields(&mut self) {
        if self.get("name").is_none() {
            let full = [self.get("firstName"), self.get("lastName")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !full.is_empty() {
                self.insert("name", &full);
            }
        }

        let dob = self
            .get("dateOfBirth")
            .or_else(|| self.get("dob"))
            .or_else(|| self.get("birthDate"))
            .map(|s| s.to_string());

        match dob {
            Some(dob) => {
                if let Some((year, month, day)) = split_iso_date(&dob) {
                    for (key, value) in [("birthYear", year), ("birthMonth", month), ("birthDay", day)] {
                        if self.get(key).is_none() {
                            self.insert(key, &value.to_string());
                        }
                    }
                }
                if self.get("dateOfBirth").is_none() {
                    self.insert("dateOfBirth", &dob);
                }
            }
            None => {
                let parts = (
                    self.get("birthYear").and_then(|v| v.trim().parse::<u32>().ok()),
                    self.get("birthMonth").and_then(|v| v.trim().parse::<u32>().ok()),
                    self.get("birthDay").and_then(|v| v.trim().parse::<u32>().ok()),
                );
                if let (Some(year), Some(month), Some(day)) = parts {
                    self.insert("dateOfBirth", &format!("{:04}-{:02}-{:02}", year, month, day));
                }
            }
        }
    }
}

fn compact(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn flatten_into(map: &Map<String, Value>, out: &mut BTreeMap<String, String>) {
    // Top-level scalars win over values found in nested objects.
    for (key, value) in map {
        if let Some(scalar) = scalar_string(value) {
            out.insert(key.clone(), scalar);
        }
    }
    for value in map.values() {
        if let Value::Object(nested) = value {
            let mut inner = BTreeMap::new();
            flatten_into(nested, &mut inner);
            for (key, value) in inner {
                out.entry(key).or_insert(value);
            }
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_iso_date(raw: &str) -> Option<(u32, u32, u32)> {
    let date = raw.trim().get(..10)?;
    let mut parts = date.split('-');
    let year = parts.next()?.parse::<u32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    (year >= 1000 && (1..=12).contains(&month) && (1..=31).contains(&day)).then_some((year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_nested_data_is_flattened() {
        let profile = Profile::from_value(&json!({
            "profileName": "jane",
            "data": {
                "firstName": "Jane",
                "lastName": "Doe",
                "address": { "city": "Austin", "zip": 78701 }
            },
            "email": "jane@x.com"
        }));

        assert_eq!(profile.name.as_deref(), Some("jane"));
        assert_eq!(profile.get("firstName"), Some("Jane"));
        assert_eq!(profile.get("zip"), Some("78701"));
        assert_eq!(profile.get("city"), Some("Austin"));
        assert_eq!(profile.get("name"), Some("Jane Doe"));
        assert_eq!(profile.get_loose("first_name"), Some("Jane"));
    }

    #[test]
    fn test_date_of_birth_is_split_and_joined() {
        let split = Profile::from_value(&json!({ "dob": "1999-12-05" }));
        assert_eq!(split.get("birthYear"), Some("1999"));
        assert_eq!(split.get("birthMonth"), Some("12"));
        assert_eq!(split.get("birthDay"), Some("5"));
        assert_eq!(split.get("dateOfBirth"), Some("1999-12-05"));

        let joined = Profile::from_value(&json!({ "birthYear": 1985, "birthMonth": "3", "birthDay": "7" }));
        assert_eq!(joined.get("dateOfBirth"), Some("1985-03-07"));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let profile = Profile::from_value(&json!({ "email": "  ", "phone": null }));
        assert_eq!(profile.get("email"), None);
        assert_eq!(profile.get("phone"), None);
    }

    #[test]
    fn test_load_failures_are_profile_errors() {
        let err = Profile::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ReplayError::ProfileLoad(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        assert!(matches!(Profile::load(file.path()), Err(ReplayError::ProfileLoad(_))));
    }

    #[test]
    fn test_load_names_profile_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.json");
        std::fs::write(&path, r#"{"firstName":"Alice"}"#).unwrap();

        let profile = Profile::load(&path).unwrap();
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.get("firstName"), Some("Alice"));
    }
}
