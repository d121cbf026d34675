//! Free-text tag registry.
//!
//! Tags are typed by the user and resolved against the known set by
//! normalized name: surrounding whitespace is trimmed, inner whitespace runs
//! collapse to one space, and matching ignores case.

use super::task::{Tag, TagId, Task};

/// Trims and collapses whitespace. Returns `None` for a blank name.
pub fn normalize_name(raw: &str) -> Option<String> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!normalized.is_empty()).then_some(normalized)
}

/// The set of tags known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRegistry {
    tags: Vec<Tag>,
}

impl TagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry with the distinct tags attached to `tasks`.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut registry = Self::new();
        for tag in tasks.iter().flat_map(|task| task.tags.iter()) {
            if !registry.tags.iter().any(|known| known.id == tag.id) {
                registry.tags.push(tag.clone());
            }
        }
        registry
    }

    /// All known tags in insertion order.
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Finds a tag by normalized, case-insensitive name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Tag> {
        let wanted = normalize_name(name)?.to_lowercase();
        self.tags
            .iter()
            .find(|tag| tag.name.to_lowercase() == wanted)
    }

    /// Resolves `raw` to an existing tag or registers a new one.
    ///
    /// Returns `None` when the name is blank. The returned id is stable: asking
    /// again with any spelling that normalizes to the same name yields the same
    /// tag.
    pub fn find_or_create(&mut self, raw: &str) -> Option<Tag> {
        let name = normalize_name(raw)?;
        if let Some(existing) = self.find(&name) {
            return Some(existing.clone());
        }
        let tag = Tag::new(TagId::generate(), name);
        tracing::debug!(tag_id = %tag.id.as_str(), name = %tag.name, "Registered new tag");
        self.tags.push(tag.clone());
        Some(tag)
    }

    /// Tags whose name contains `query` (case-insensitive), skipping the ids in
    /// `exclude`.
    #[must_use]
    pub fn suggest(&self, query: &str, exclude: &[Tag]) -> Vec<&Tag> {
        let needle = query.trim().to_lowercase();
        self.tags
            .iter()
            .filter(|tag| !exclude.iter().any(|selected| selected.id == tag.id))
            .filter(|tag| tag.name.to_lowercase().contains(&needle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  Deep   work ", Some("Deep work"))]
    #[case("focus", Some("focus"))]
    #[case("   ", None)]
    #[case("", None)]
    fn test_normalize_name(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_name(raw).as_deref(), expected);
    }

    #[rstest]
    fn test_find_or_create_returns_same_tag_for_equivalent_names() {
        let mut registry = TagRegistry::new();
        let first = registry.find_or_create("Deep Work").unwrap();
        let second = registry.find_or_create("  deep   WORK").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.tags().len(), 1);
        assert_eq!(first.name, "Deep Work");
    }

    #[rstest]
    fn test_find_or_create_ignores_blank_input() {
        let mut registry = TagRegistry::new();
        assert!(registry.find_or_create(" \t ").is_none());
        assert!(registry.tags().is_empty());
    }

    #[rstest]
    fn test_suggest_filters_by_substring_and_excludes_selected() {
        let mut registry = TagRegistry::new();
        let design = registry.find_or_create("Design").unwrap();
        registry.find_or_create("Design review").unwrap();
        registry.find_or_create("Errands").unwrap();

        let names: Vec<&str> = registry
            .suggest("SIGN", std::slice::from_ref(&design))
            .iter()
            .map(|tag| tag.name.as_str())
            .collect();
        assert_eq!(names, vec!["Design review"]);
    }

    #[rstest]
    fn test_from_tasks_collects_distinct_tags() {
        use crate::domain::task::{TaskDraft, TaskId, UserId};

        let design = Tag::new(TagId::new("design"), "Design");
        let home = Tag::new(TagId::new("home"), "Home");
        let tasks = vec![
            TaskDraft::new("a")
                .with_tags(vec![design.clone()])
                .into_task(TaskId::new("1"), UserId::local())
                .unwrap(),
            TaskDraft::new("b")
                .with_tags(vec![design, home])
                .into_task(TaskId::new("2"), UserId::local())
                .unwrap(),
        ];
        let registry = TagRegistry::from_tasks(&tasks);
        assert_eq!(registry.tags().len(), 2);
        assert!(registry.find("HOME").is_some());
    }
}
