use std::collections::BTreeSet;
use std::fmt;

/// An unordered set of non-empty labels, persisted as a comma-joined string.
/// Backends that only speak a flat string field (most CalDAV CATEGORIES
/// properties) serialize through `to_string`/`parse` at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        TagSet(BTreeSet::new())
    }

    pub fn insert(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let trimmed = tag.trim();
        if !trimmed.is_empty() {
            self.0.insert(trimmed.to_string());
        }
    }

    pub fn remove(&mut self, tag: &str) {
        self.0.remove(tag.trim());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().collect::<Vec<_>>().join(","))
    }
}

impl std::str::FromStr for TagSet {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut set = TagSet::new();
        for tag in value.split(',') {
            set.insert(tag);
        }
        Ok(set)
    }
}

impl FromIterator<String> for TagSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_comma_string() {
        let set: TagSet = "work, urgent,, home".parse().unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("work"));
        assert!(set.contains("urgent"));
        assert!(set.contains("home"));
    }

    #[test]
    fn blank_tags_are_dropped() {
        let mut set = TagSet::new();
        set.insert("   ");
        assert!(set.is_empty());
    }
}
