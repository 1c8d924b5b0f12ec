//! Element Attributes
//!
//! Attribute names are ASCII case-insensitive; they are stored lower-case.

use std::collections::HashMap;

/// Named node map (attribute collection), insertion ordered
#[derive(Debug, Clone, Default)]
pub struct NamedNodeMap {
    attributes: Vec<Attr>,
    by_name: HashMap<String, usize>,
}

/// Single attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

impl Attr {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            value: value.into(),
        }
    }
}

impl NamedNodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn length(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&Attr> {
        self.attributes.get(index)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        let index = *self.by_name.get(&name.to_ascii_lowercase())?;
        self.attributes.get(index).map(|a| a.value.as_str())
    }

    /// Set an attribute, returning the previous value
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Option<String> {
        let attr = Attr::new(name, value);
        if let Some(&index) = self.by_name.get(&attr.name) {
            let old = std::mem::replace(&mut self.attributes[index], attr);
            Some(old.value)
        } else {
            self.by_name.insert(attr.name.clone(), self.attributes.len());
            self.attributes.push(attr);
            None
        }
    }

    /// Remove an attribute, returning its value
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.by_name.remove(&name.to_ascii_lowercase())?;
        for idx in self.by_name.values_mut() {
            if *idx > index {
                *idx -= 1;
            }
        }
        Some(self.attributes.remove(index).value)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_names() {
        let mut map = NamedNodeMap::new();
        map.set_attribute("Data-Value", "1");
        assert_eq!(map.get_attribute("data-value"), Some("1"));
        assert_eq!(map.get_attribute("DATA-VALUE"), Some("1"));
        assert_eq!(map.set_attribute("DATA-value", "2"), Some("1".to_string()));
        assert_eq!(map.length(), 1);
        assert_eq!(map.names(), vec!["data-value"]);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut map = NamedNodeMap::new();
        map.set_attribute("a", "1");
        map.set_attribute("b", "2");
        map.set_attribute("c", "3");
        assert_eq!(map.remove_attribute("B"), Some("2".to_string()));
        assert_eq!(map.get_attribute("c"), Some("3"));
        assert_eq!(map.names(), vec!["a", "c"]);
        assert!(map.remove_attribute("missing").is_none());
    }
}
