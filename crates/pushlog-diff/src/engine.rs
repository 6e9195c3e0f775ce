use std::collections::HashMap;

use pushlog_vcs::{ChangedPaths, PathStatus, RevisionId, VcsError, WorkingCopy};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::format::{Entities, ResourceFormat};
use crate::tokens::{diff_tokens, Token};
use crate::tree::DataTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Added,
    Removed,
    Changed,
}

/// One side of an entity diff record. An absent side serializes as `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffValue {
    Empty,
    Tokens(Vec<Token>),
}

impl Serialize for DiffValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiffValue::Empty => serializer.serialize_str(""),
            DiffValue::Tokens(tokens) => tokens.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDiff {
    pub class: EntityClass,
    pub entity: String,
    pub oldval: DiffValue,
    pub newval: DiffValue,
}

impl EntityDiff {
    fn added(entity: &str, value: &str) -> Self {
        Self {
            class: EntityClass::Added,
            entity: entity.to_string(),
            oldval: DiffValue::Empty,
            newval: DiffValue::Tokens(vec![Token::plain(value)]),
        }
    }

    fn removed(entity: &str, value: &str) -> Self {
        Self {
            class: EntityClass::Removed,
            entity: entity.to_string(),
            oldval: DiffValue::Tokens(vec![Token::plain(value)]),
            newval: DiffValue::Empty,
        }
    }

    fn changed(entity: &str, old: &str, new: &str) -> Self {
        let (oldval, newval) = diff_tokens(old, new);
        Self {
            class: EntityClass::Changed,
            entity: entity.to_string(),
            oldval: DiffValue::Tokens(oldval),
            newval: DiffValue::Tokens(newval),
        }
    }
}

/// Entity records between two parsed versions of a file.
///
/// Records follow the old file's order. Entities only present in the new
/// file are placed right after the closest preceding entity the two
/// versions share; those before any shared entity come first.
pub fn diff_entities(old: &Entities, new: &Entities) -> Vec<EntityDiff> {
    let mut leading = Vec::new();
    let mut anchored: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    let mut anchor: Option<&str> = None;

    for (key, value) in new.iter() {
        if old.contains(key) {
            anchor = Some(key);
            continue;
        }
        match anchor {
            Some(shared) => anchored.entry(shared).or_default().push((key, value)),
            None => leading.push((key, value)),
        }
    }

    let mut records: Vec<EntityDiff> = leading
        .into_iter()
        .map(|(key, value)| EntityDiff::added(key, value))
        .collect();

    for (key, old_value) in old.iter() {
        match new.get(key) {
            None => records.push(EntityDiff::removed(key, old_value)),
            Some(new_value) if new_value != old_value => {
                records.push(EntityDiff::changed(key, old_value, new_value))
            }
            Some(_) => {}
        }
        if let Some(following) = anchored.remove(key) {
            records.extend(
                following
                    .into_iter()
                    .map(|(key, value)| EntityDiff::added(key, value)),
            );
        }
    }

    records
}

/// How a file node should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileClass {
    /// Entity records available
    File,
    /// Parsed fine, no entity-level differences
    EmptyDiff,
    /// One side could not be parsed
    Unparsable,
}

/// Diff result for one changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub status: PathStatus,
    pub class: FileClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<EntityDiff>>,
    /// Origin of a moved file
    pub renamed: Option<String>,
    /// Origin of a copied file
    pub copied: Option<String>,
    /// Revision the file content is shown at
    pub rev: RevisionId,
}

/// Computes entity-level diffs for the paths of a [`ChangedPaths`].
pub struct EntityDiffEngine<'a> {
    repo: &'a dyn WorkingCopy,
    changed: &'a ChangedPaths,
}

impl<'a> EntityDiffEngine<'a> {
    pub fn new(repo: &'a dyn WorkingCopy, changed: &'a ChangedPaths) -> Self {
        Self { repo, changed }
    }

    /// Entity records for one path, or `None` when either side has no
    /// parser, is not valid text, or does not parse.
    pub fn diff_lines(
        &self,
        path: &str,
        status: PathStatus,
    ) -> Result<Option<Vec<EntityDiff>>, VcsError> {
        let format = ResourceFormat::from_path(path);
        if format == ResourceFormat::Unknown {
            return Ok(None);
        }

        let old = match status {
            PathStatus::Added => Entities::default(),
            _ => {
                let old_path = self.changed.old_path(path);
                let content = self.repo.file_content(old_path, &self.changed.from)?;
                match format.parse_entities(&content) {
                    Ok(entities) => entities,
                    Err(e) => {
                        warn!(
                            path = old_path,
                            rev = self.changed.from.short(),
                            error = %e,
                            "Cannot parse file"
                        );
                        return Ok(None);
                    }
                }
            }
        };

        let new = match status {
            PathStatus::Removed => Entities::default(),
            _ => {
                let content = self.repo.file_content(path, &self.changed.to)?;
                match format.parse_entities(&content) {
                    Ok(entities) => entities,
                    Err(e) => {
                        warn!(path, rev = self.changed.to.short(), error = %e, "Cannot parse file");
                        return Ok(None);
                    }
                }
            }
        };

        let records = diff_entities(&old, &new);
        debug!(path, %status, records = records.len(), "Diffed entities");
        Ok(Some(records))
    }

    pub fn file_diff(&self, path: &str, status: PathStatus) -> Result<FileDiff, VcsError> {
        let lines = self.diff_lines(path, status)?;
        let class = match &lines {
            None => FileClass::Unparsable,
            Some(records) if records.is_empty() => FileClass::EmptyDiff,
            Some(_) => FileClass::File,
        };
        let rev = match status {
            PathStatus::Removed => self.changed.from.clone(),
            _ => self.changed.to.clone(),
        };

        Ok(FileDiff {
            path: path.to_string(),
            status,
            class,
            lines,
            renamed: self.changed.moved.get(path).cloned(),
            copied: self.changed.copied.get(path).cloned(),
            rev,
        })
    }

    /// File diffs for every changed path, in path order of the VCS.
    pub fn diff_all(&self) -> Result<Vec<FileDiff>, VcsError> {
        self.changed
            .paths
            .iter()
            .map(|(path, status)| self.file_diff(path, *status))
            .collect()
    }

    /// [`diff_all`](Self::diff_all) nested by path segment.
    pub fn diff_tree(&self) -> Result<DataTree<FileDiff>, VcsError> {
        Ok(build_tree(self.diff_all()?))
    }
}

pub fn build_tree(diffs: impl IntoIterator<Item = FileDiff>) -> DataTree<FileDiff> {
    DataTree::from_entries(diffs.into_iter().map(|diff| (diff.path.clone(), diff)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenClass;

    fn fluent(content: &str) -> Entities {
        ResourceFormat::Fluent
            .parse_entities(content.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_added_entity_only() {
        let old = fluent("key1 = My Value\n");
        let new = fluent("key1 = My Value\nkey2 = Other\n");

        let records = diff_entities(&old, &new);

        assert_eq!(records, vec![EntityDiff::added("key2", "Other")]);
        assert_eq!(
            serde_json::to_value(&records[0]).unwrap(),
            serde_json::json!({
                "class": "added",
                "entity": "key2",
                "oldval": "",
                "newval": [{"value": "Other"}]
            })
        );
    }

    #[test]
    fn test_changed_message_and_attribute() {
        let old = fluent("key1 = My Value\n.attr = Attrbute\n");
        let new = fluent("key1 = My New Value\n.attr = Attribute\n");

        let records = diff_entities(&old, &new);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity, "key1");
        assert_eq!(records[1].entity, "key1.attr");
        for record in &records {
            assert_eq!(record.class, EntityClass::Changed);
            let DiffValue::Tokens(tokens) = &record.newval else {
                panic!("changed record without new tokens");
            };
            assert!(tokens
                .iter()
                .any(|t| t.class == Some(TokenClass::Insert)));
        }
    }

    #[test]
    fn test_equal_entities_omitted() {
        let old = fluent("a = 1\nb = 2\n");
        let new = fluent("b = 2\na = 1\n");
        assert!(diff_entities(&old, &new).is_empty());
    }

    #[test]
    fn test_removed_entity() {
        let old = fluent("a = 1\nb = 2\n");
        let new = fluent("a = 1\n");
        assert_eq!(diff_entities(&old, &new), vec![EntityDiff::removed("b", "2")]);
    }

    #[test]
    fn test_new_entities_follow_their_anchor() {
        let old = fluent("a = 1\nb = 2\nc = 3\n");
        let new = fluent("first = 0\na = 1\nafter-a = 1.5\nc = 3\nlast = 4\n");

        let records = diff_entities(&old, &new);
        let order: Vec<(&str, EntityClass)> = records
            .iter()
            .map(|r| (r.entity.as_str(), r.class))
            .collect();

        assert_eq!(
            order,
            vec![
                ("first", EntityClass::Added),
                ("after-a", EntityClass::Added),
                ("b", EntityClass::Removed),
                ("last", EntityClass::Added),
            ]
        );
    }

    #[test]
    fn test_added_file_has_no_old_side() {
        let new = fluent("a = 1\nb = 2\n");
        let records = diff_entities(&Entities::default(), &new);

        assert_eq!(
            records,
            vec![EntityDiff::added("a", "1"), EntityDiff::added("b", "2")]
        );
    }
}
