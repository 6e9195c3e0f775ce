use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

/// A node of a [`DataTree`]. Intermediate directories carry no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<T> {
    pub value: Option<T>,
    pub children: BTreeMap<String, Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

/// Values keyed by `/`-separated paths, nested one level per segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTree<T> {
    root: Node<T>,
}

impl<T> Default for DataTree<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
        }
    }
}

impl<T> DataTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, value)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut tree = Self::new();
        for (path, value) in entries {
            tree.insert(&path, value);
        }
        tree
    }

    /// Set the value at `path`, creating intermediate nodes.
    pub fn insert(&mut self, path: &str, value: T) {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.value = Some(value);
    }

    pub fn get(&self, path: &str) -> Option<&T> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        node.value.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Every node below the root as `(path, node)`, depth first with
    /// siblings in lexicographic order.
    pub fn entries(&self) -> Vec<(String, &Node<T>)> {
        let mut out = Vec::new();
        collect(&self.root, "", &mut out);
        out
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn collect<'t, T>(node: &'t Node<T>, prefix: &str, out: &mut Vec<(String, &'t Node<T>)>) {
    for (segment, child) in &node.children {
        let path = if prefix.is_empty() {
            segment.clone()
        } else {
            format!("{prefix}/{segment}")
        };
        out.push((path.clone(), child));
        collect(child, &path, out);
    }
}

#[derive(Serialize)]
struct NodeView<'t, T> {
    segment: &'t str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'t T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeView<'t, T>>,
}

#[derive(Serialize)]
struct TreeView<'t, T> {
    children: Vec<NodeView<'t, T>>,
}

fn views<'t, T>(node: &'t Node<T>, prefix: &str) -> Vec<NodeView<'t, T>> {
    node.children
        .iter()
        .map(|(segment, child)| {
            let path = if prefix.is_empty() {
                segment.clone()
            } else {
                format!("{prefix}/{segment}")
            };
            NodeView {
                segment,
                children: views(child, &path),
                value: child.value.as_ref(),
                path,
            }
        })
        .collect()
}

impl<T: Serialize> Serialize for DataTree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TreeView {
            children: views(&self.root, ""),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let mut tree = DataTree::new();
        tree.insert("browser/chrome/app.ftl", 1);
        tree.insert("browser/menu.ftl", 2);

        assert_eq!(tree.get("browser/chrome/app.ftl"), Some(&1));
        assert_eq!(tree.get("browser/menu.ftl"), Some(&2));
        assert_eq!(tree.get("browser"), None);
        assert_eq!(tree.get("toolkit/x.ftl"), None);
    }

    #[test]
    fn test_entries_in_lexicographic_order() {
        let tree = DataTree::from_entries(vec![
            ("toolkit/b.ftl".to_string(), "b"),
            ("browser/z.ftl".to_string(), "z"),
            ("browser/a.ftl".to_string(), "a"),
        ]);

        let paths: Vec<(String, Option<&str>)> = tree
            .entries()
            .into_iter()
            .map(|(path, node)| (path, node.value))
            .collect();

        assert_eq!(
            paths,
            vec![
                ("browser".to_string(), None),
                ("browser/a.ftl".to_string(), Some("a")),
                ("browser/z.ftl".to_string(), Some("z")),
                ("toolkit".to_string(), None),
                ("toolkit/b.ftl".to_string(), Some("b")),
            ]
        );
    }

    #[test]
    fn test_single_child_chains_not_collapsed() {
        let tree = DataTree::from_entries(vec![("a/b/c.ftl".to_string(), 7)]);
        assert_eq!(tree.entries().len(), 3);
    }

    #[test]
    fn test_json_shape() {
        let tree = DataTree::from_entries(vec![
            ("mobile/app.ftl".to_string(), "x"),
            ("README".to_string(), "y"),
        ]);

        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "children": [
                    {"segment": "README", "path": "README", "value": "y"},
                    {
                        "segment": "mobile",
                        "path": "mobile",
                        "children": [
                            {"segment": "app.ftl", "path": "mobile/app.ftl", "value": "x"}
                        ]
                    }
                ]
            })
        );
    }

    #[test]
    fn test_empty_tree() {
        let tree: DataTree<u8> = DataTree::new();
        assert!(tree.is_empty());
        assert_eq!(serde_json::to_value(&tree).unwrap(), json!({"children": []}));
    }
}
