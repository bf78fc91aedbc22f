//! Read-only transactional reader over the config tree (spec 6, ~5% of core).
//!
//! Backed by a `toml::Value` tree. A `ConfigTxn` is a cheap `Clone` cursor
//! over a shared `Arc<ConfigNode>`; "opening a transaction" is just cloning
//! one, and there is nothing to explicitly release — it drops like any
//! other value, on every exit path, which is the property Design Notes 9
//! asks for.

use std::sync::Arc;

/// Table entries keep declaration order (spec: "processes ... order = config
/// order"); `toml`'s `preserve_order` feature keeps the source `toml::Value`
/// ordered, and we mirror that here with a `Vec` instead of a `BTreeMap`.
#[derive(Debug, Clone)]
pub enum ConfigNode {
    Scalar(toml::Value),
    Table(Vec<(String, Arc<ConfigNode>)>),
}

impl ConfigNode {
    pub fn from_toml(value: &toml::Value) -> Arc<ConfigNode> {
        match value {
            toml::Value::Table(t) => {
                let entries = t
                    .iter()
                    .map(|(k, v)| (k.clone(), ConfigNode::from_toml(v)))
                    .collect();
                Arc::new(ConfigNode::Table(entries))
            }
            other => Arc::new(ConfigNode::Scalar(other.clone())),
        }
    }
}

/// A read-only, scoped cursor into the config tree.
#[derive(Debug, Clone)]
pub struct ConfigTxn {
    path: String,
    node: Arc<ConfigNode>,
}

impl ConfigTxn {
    pub fn root(value: &toml::Value) -> Self {
        ConfigTxn {
            path: String::new(),
            node: ConfigNode::from_toml(value),
        }
    }

    /// Full dotted path of this node from the tree root, e.g. "apps/foo/procs/bar".
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The final path component (spec 4.1: app name = basename of cfg_path).
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn child(&self, name: &str) -> Option<ConfigTxn> {
        match &*self.node {
            ConfigNode::Table(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, node)| ConfigTxn {
                path: if self.path.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", self.path, name)
                },
                node: Arc::clone(node),
            }),
            ConfigNode::Scalar(_) => None,
        }
    }

    /// Lazy finite sequence of sub-readers, in config order (spec Design Notes 9).
    pub fn children(&self) -> impl Iterator<Item = ConfigTxn> + '_ {
        let entries: &[(String, Arc<ConfigNode>)] = match &*self.node {
            ConfigNode::Table(entries) => entries.as_slice(),
            ConfigNode::Scalar(_) => &[],
        };
        entries.iter().map(move |(name, node)| ConfigTxn {
            path: if self.path.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", self.path, name)
            },
            node: Arc::clone(node),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.node {
            ConfigNode::Scalar(toml::Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.node {
            ConfigNode::Scalar(toml::Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &*self.node {
            ConfigNode::Scalar(toml::Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str_array(&self) -> Option<Vec<String>> {
        match &*self.node {
            ConfigNode::Scalar(toml::Value::Array(items)) => {
                Some(items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            }
            _ => None,
        }
    }

    pub fn child_str(&self, name: &str) -> Option<String> {
        self.child(name).and_then(|c| c.as_str().map(String::from))
    }

    pub fn child_bool(&self, name: &str, default: bool) -> bool {
        self.child(name).and_then(|c| c.as_bool()).unwrap_or(default)
    }
}

/// Owns the whole config tree and vends root transactions. `Clone` is a
/// deep copy of the underlying `toml::Value`; `Supervisor` keeps one of
/// these and clones it on demand wherever a collaborator borrow of `self`
/// would otherwise conflict with borrowing the config.
#[derive(Clone)]
pub struct ConfigTree {
    root: toml::Value,
}

impl ConfigTree {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        Ok(ConfigTree {
            root: toml::from_str(text)?,
        })
    }

    pub fn empty() -> Self {
        ConfigTree {
            root: toml::Value::Table(Default::default()),
        }
    }

    /// Opens a read-only transaction scoped at `path` (slash-separated),
    /// e.g. "apps/foo".
    pub fn open(&self, path: &str) -> Option<ConfigTxn> {
        let mut txn = ConfigTxn::root(&self.root);
        if path.is_empty() {
            return Some(txn);
        }
        for part in path.split('/') {
            txn = txn.child(part)?;
        }
        Some(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [apps.foo]
        sandboxed = true

        [apps.foo.procs.main]
        exe = "/bin/main"
        args = ["--flag", "value"]

        [apps.foo.procs.helper]
        exe = "/bin/helper"

        [apps.foo.groups.net]
        [apps.foo.groups.disk]
    "#;

    #[test]
    fn walks_children_in_order() {
        let tree = ConfigTree::parse(SAMPLE).unwrap();
        let app = tree.open("apps/foo").unwrap();
        assert_eq!(app.basename(), "foo");
        assert!(app.child_bool("sandboxed", false));

        let procs = app.child("procs").unwrap();
        let names: Vec<String> = procs.children().map(|c| c.basename().to_string()).collect();
        assert_eq!(names, vec!["main".to_string(), "helper".to_string()]);

        let main = procs.child("main").unwrap();
        assert_eq!(main.child_str("exe").unwrap(), "/bin/main");
        assert_eq!(
            main.child("args").unwrap().as_str_array().unwrap(),
            vec!["--flag".to_string(), "value".to_string()]
        );
    }

    #[test]
    fn missing_path_is_none() {
        let tree = ConfigTree::parse(SAMPLE).unwrap();
        assert!(tree.open("apps/bar").is_none());
    }

    #[test]
    fn groups_enumerate() {
        let tree = ConfigTree::parse(SAMPLE).unwrap();
        let groups = tree.open("apps/foo/groups").unwrap();
        assert_eq!(groups.children().count(), 2);
    }
}
