//! In-process hierarchical key-value tree.
//!
//! The tree is a single JSON document. Paths address nested object keys; empty
//! objects are pruned so a cleared partition reads back as absent, the same way
//! a hosted realtime tree behaves. When a snapshot path is configured, the
//! whole tree is rewritten to disk after every mutation.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;

use super::FastStore;

/// Slash-separated location inside the tree, e.g. `alice/RawData/1000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<String>);

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        raw.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(Self::root(), |path, segment| path.child(segment))
    }

    pub fn child(mut self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        if segment.is_empty() || segment.contains('/') {
            bail!("invalid tree path segment '{segment}'");
        }
        self.0.push(segment);
        Ok(self)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

#[derive(Clone)]
pub struct JsonTreeStore {
    root: Arc<RwLock<Value>>,
    snapshot_path: Option<Arc<PathBuf>>,
    /// Held from a mutation until its snapshot is on disk, so snapshots are
    /// written one at a time and in mutation order.
    write_lock: Arc<AsyncMutex<()>>,
}

impl JsonTreeStore {
    /// Tree that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            snapshot_path: None,
            write_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Tree backed by a JSON snapshot file, loaded now if it exists.
    pub fn with_snapshot(path: PathBuf) -> Result<Self> {
        let root = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read fast store snapshot {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("corrupt fast store snapshot {}", path.display()))?
        } else {
            Value::Object(Map::new())
        };

        info!("Fast store snapshot at {}", path.display());

        Ok(Self {
            root: Arc::new(RwLock::new(root)),
            snapshot_path: Some(Arc::new(path)),
            write_lock: Arc::new(AsyncMutex::new(())),
        })
    }

    fn read_node(&self, path: &TreePath) -> Option<Value> {
        let guard = match self.root.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut node = &*guard;
        for segment in path.segments() {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    /// Applies `mutation` under the tree lock and returns the tree to persist.
    fn mutate<F>(&self, mutation: F) -> Option<Value>
    where
        F: FnOnce(&mut Value),
    {
        let mut guard = match self.root.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        mutation(&mut guard);
        self.snapshot_path.as_ref().map(|_| guard.clone())
    }

    /// Callers must hold `write_lock` from `mutate` until this returns.
    async fn persist(&self, tree: Option<Value>) -> Result<()> {
        let (Some(tree), Some(path)) = (tree, self.snapshot_path.clone()) else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let serialized = serde_json::to_string(&tree)?;

            // Readers only ever see a complete snapshot: write aside, then swap.
            let staging = staging_path(&path);
            std::fs::write(&staging, serialized).with_context(|| {
                format!("failed to write fast store snapshot {}", staging.display())
            })?;
            std::fs::rename(&staging, path.as_path()).with_context(|| {
                format!("failed to replace fast store snapshot {}", path.display())
            })
        })
        .await
        .context("fast store snapshot worker join failed")?
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

fn set_node(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

/// Removes the node at `segments`; returns true when its parent became empty.
fn remove_node(node: &mut Value, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };

    if rest.is_empty() {
        map.remove(first);
    } else if let Some(child) = map.get_mut(first) {
        if remove_node(child, rest) {
            map.remove(first);
        }
    }
    map.is_empty()
}

#[async_trait]
impl FastStore for JsonTreeStore {
    async fn remove(&self, path: &TreePath) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let tree = self.mutate(|root| {
            if path.is_root() {
                *root = Value::Object(Map::new());
            } else {
                remove_node(root, path.segments());
            }
        });
        self.persist(tree).await
    }

    async fn set(&self, path: &TreePath, value: Value) -> Result<()> {
        if value.is_null() {
            return self.remove(path).await;
        }
        let _write = self.write_lock.lock().await;
        let tree = self.mutate(|root| set_node(root, path.segments(), value));
        self.persist(tree).await
    }

    async fn get(&self, path: &TreePath) -> Result<Option<Value>> {
        Ok(self.read_node(path))
    }
}
