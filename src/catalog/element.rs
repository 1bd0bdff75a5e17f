//! Generic definition element trees.
//!
//! Command definitions arrive as already-parsed markup: each node has a tag
//! name, attributes, text content and children. Serializable so trees can be
//! shipped as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node of a parsed definition document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    /// Tag name (`project`, `class`, `cmd`, `arg`, `enum`).
    pub tag: String,
    /// Attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Text content.
    #[serde(default)]
    pub text: String,
    /// Child nodes in document order.
    #[serde(default)]
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an empty element with the given tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }

    /// Sets the text content.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Appends a child.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Appends several children.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the `name` attribute, or an empty string.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get("name").unwrap_or_default()
    }

    /// Returns the numeric `id` attribute.
    #[must_use]
    pub fn id(&self) -> Option<u16> {
        self.get("id").and_then(|id| id.trim().parse().ok())
    }

    /// Iterates over children with the given tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Finds a child with the given tag and `name` attribute.
    #[must_use]
    pub fn find_by_name(&self, tag: &str, name: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|c| c.tag == tag && c.name() == name)
    }

    /// Finds a child with the given tag and `id` attribute.
    #[must_use]
    pub fn find_by_id(&self, tag: &str, id: u16) -> Option<&Self> {
        self.children
            .iter()
            .find(|c| c.tag == tag && c.id() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element::new("project")
            .attr("name", "minidrone")
            .attr("id", 2)
            .child(Element::new("class").attr("name", "Piloting").attr("id", 0))
            .child(Element::new("class").attr("name", "Animations").attr("id", 4))
    }

    #[test]
    fn test_lookup_children() {
        let project = sample();
        assert_eq!(project.id(), Some(2));
        assert_eq!(project.find_by_name("class", "Animations").and_then(Element::id), Some(4));
        assert_eq!(project.find_by_id("class", 0).map(Element::name), Some("Piloting"));
        assert!(project.find_by_name("cmd", "Piloting").is_none());
    }

    #[test]
    fn test_found_child_outlives_query() {
        let project = sample();
        let found = {
            let tag = String::from("class");
            let name = String::from("Piloting");
            project.find_by_name(&tag, &name)
        };
        assert_eq!(found.and_then(Element::id), Some(0));

        let found = {
            let tag = String::from("class");
            project.find_by_id(&tag, 4)
        };
        assert_eq!(found.map(Element::name), Some("Animations"));
    }

    #[test]
    fn test_json_round_trip() {
        let project = sample();
        let json = serde_json::to_string(&project).unwrap();
        let parsed: Element = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, project);

        let minimal: Element = serde_json::from_str(r#"{"tag": "cmd"}"#).unwrap();
        assert!(minimal.children.is_empty());
    }
}
