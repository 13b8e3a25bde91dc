use serde_json::Value as Json;
use std::fmt;

/// Validation messages keyed by attribute name or dotted path.
///
/// Keys keep the order in which they were first added. Nested errors use
/// `"<association>.<index>.<field>"` for collections and
/// `"<association>.<field>"` for single children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Errors {
    entries: Vec<(String, Vec<String>)>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        let key = key.into();
        let message = message.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, messages)) => messages.push(message),
            None => self.entries.push((key, vec![message])),
        }
    }

    /// Messages under `key`; empty when there are none.
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn delete(&mut self, key: &str) -> Vec<String> {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => self.entries.remove(index).1,
            None => Vec::new(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        !self.get(key).is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, messages)| messages.iter().map(move |m| (k.as_str(), m.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, messages)| messages.is_empty())
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, messages)| messages.len()).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy every message of `other` under `"<prefix>.<key>"` (or the bare key
    /// without a prefix), skipping (key, message) pairs already present.
    pub fn import(&mut self, other: &Errors, prefix: Option<&str>) {
        for (key, message) in other.iter() {
            let key = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key),
                None => key.to_string(),
            };
            if !self.get(&key).iter().any(|m| m == message) {
                self.add(key, message);
            }
        }
    }

    /// `"title can't be blank"` style messages. `base` messages stand alone.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(key, message)| {
                if key == "base" {
                    message.to_string()
                } else {
                    format!("{} {}", key, message)
                }
            })
            .collect()
    }

    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        for (key, messages) in &self.entries {
            map.insert(
                key.clone(),
                Json::Array(messages.iter().cloned().map(Json::String).collect()),
            );
        }
        Json::Object(map)
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}
