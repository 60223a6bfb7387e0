//! Hierarchical label-indexed record cache with wildcard lookup.
//!
//! Names are stored as reversed label paths: for the authoritative domain
//! `cluster.local`, the service `web` in namespace `prod` lives under
//! `["local", "cluster", "svc", "prod", "web"]`. Each node keeps leaf
//! payloads keyed by leaf key alongside its child nodes, so a single name
//! can carry both a subtree (SRV children) and sibling address records.
//!
//! The cache itself is not synchronized; `RecordStore` guards it together
//! with the reverse index under one lock.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::records::RecordValue;

/// Reserved query-time label meaning "any child at this level". Never a
/// legal stored label.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Serialize)]
struct Leaf {
    fqdn: String,
    record: Arc<RecordValue>,
}

/// A node in the record cache. The engine's root cache and every staged
/// service subtree are values of this type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeCache {
    children: BTreeMap<String, TreeCache>,
    entries: BTreeMap<String, Leaf>,
}

impl TreeCache {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the leaf `key` in the node reached by `path`,
    /// creating missing nodes. `fqdn` is carried for diagnostics only and
    /// takes no part in lookups.
    pub fn set_entry(&mut self, key: &str, record: Arc<RecordValue>, fqdn: &str, path: &[&str]) {
        let node = self.ensure_node(path);
        if let Some(prev) = node.entries.get(key) {
            if *prev.record != *record {
                debug!(key, ?path, "leaf key collision, keeping the later write");
            }
        }
        node.entries.insert(
            key.to_string(),
            Leaf {
                fqdn: fqdn.to_string(),
                record,
            },
        );
    }

    /// Replaces the child node `label` under `path` wholesale. This is the
    /// subtree swap used to update a service's records without tearing.
    pub fn set_sub_cache(&mut self, label: &str, subtree: TreeCache, path: &[&str]) {
        let node = self.ensure_node(path);
        node.children.insert(label.to_string(), subtree);
    }

    /// Exact leaf lookup at the node addressed by `path`.
    pub fn get_entry(&self, key: &str, path: &[&str]) -> Option<Arc<RecordValue>> {
        let mut node = self;
        for segment in path {
            node = node.children.get(*segment)?;
        }
        node.entries.get(key).map(|leaf| leaf.record.clone())
    }

    /// Returns every leaf at and below the node addressed by `path`, in
    /// deterministic traversal order (leaves before children, both in
    /// lexicographic order), deduplicated by payload identity.
    ///
    /// A `"*"` segment descends into every child at that level; as the
    /// final segment it keeps the current frontier, returning each node's
    /// whole subtree. A final non-wildcard segment may also match a leaf
    /// key at the parent node, which is how single-record names whose last
    /// label is a leaf key (headless endpoints, ExternalName aliases)
    /// resolve without an exact lookup.
    pub fn get_values_for_path_with_wildcards(&self, path: &[&str]) -> Vec<Arc<RecordValue>> {
        let mut results: Vec<Arc<RecordValue>> = Vec::new();
        let mut frontier: Vec<&TreeCache> = vec![self];

        for (idx, segment) in path.iter().enumerate() {
            let last = idx == path.len() - 1;
            let mut next: Vec<&TreeCache> = Vec::new();
            for node in frontier.iter().copied() {
                if *segment == WILDCARD {
                    if last {
                        next.push(node);
                    } else {
                        next.extend(node.children.values());
                    }
                } else {
                    if let Some(child) = node.children.get(*segment) {
                        next.push(child);
                    }
                    if last {
                        if let Some(leaf) = node.entries.get(*segment) {
                            results.push(leaf.record.clone());
                        }
                    }
                }
            }
            frontier = next;
        }

        for node in frontier {
            node.collect_values(&mut results);
        }

        let mut seen: HashSet<usize> = HashSet::with_capacity(results.len());
        results.retain(|record| seen.insert(Arc::as_ptr(record) as usize));
        results
    }

    /// Removes the node at `path` and prunes ancestors the removal left
    /// empty. When no child node matches the final segment, a leaf with
    /// that key is removed instead (ExternalName records are stored as
    /// leaves of the namespace node). Returns whether anything was removed.
    pub fn delete_path(&mut self, path: &[&str]) -> bool {
        if path.is_empty() {
            return false;
        }
        self.delete_path_inner(path)
    }

    fn delete_path_inner(&mut self, path: &[&str]) -> bool {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return false,
        };
        if rest.is_empty() {
            if self.children.remove(*head).is_some() {
                return true;
            }
            return self.entries.remove(*head).is_some();
        }
        let Some(child) = self.children.get_mut(*head) else {
            return false;
        };
        let removed = child.delete_path_inner(rest);
        if removed && child.is_empty() {
            self.children.remove(*head);
        }
        removed
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.entries.is_empty()
    }

    fn collect_values(&self, out: &mut Vec<Arc<RecordValue>>) {
        for leaf in self.entries.values() {
            out.push(leaf.record.clone());
        }
        for child in self.children.values() {
            child.collect_values(out);
        }
    }

    fn ensure_node(&mut self, path: &[&str]) -> &mut TreeCache {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node
    }

    /// Stable textual dump for diagnostics.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
