use std::{collections::BTreeMap, sync::Arc};

use log::{debug, warn};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::{
    definition::{ContainerDefinition, PropertyDefinition},
    node::{CreatedHook, Property, PropertyNode, join_path},
    snapshot::{ContainerSnapshot, SnapshotMode},
    utils::Error,
};

/// A named group of property nodes. Has no value of its own.
#[derive(Debug)]
pub struct PropertyContainer {
    definition: RwLock<Arc<ContainerDefinition>>,
    children: RwLock<BTreeMap<String, PropertyNode>>,
    collapsed: RwLock<Option<bool>>,
}

impl PropertyContainer {
    /// Build a container and its subtree. `prefix` is the dotted path of the
    /// container itself (empty for a root), `on_created` sees every new leaf.
    pub fn build(
        definition: Arc<ContainerDefinition>,
        prefix: &str,
        on_created: CreatedHook<'_>,
    ) -> Arc<Self> {
        let mut children = BTreeMap::new();
        for (key, child) in &definition.children {
            let node = PropertyNode::build(child, &join_path(prefix, key), on_created);
            children.insert(key.clone(), node);
        }

        Arc::new(Self {
            definition: RwLock::new(definition),
            children: RwLock::new(children),
            collapsed: RwLock::new(None),
        })
    }

    pub fn definition(&self) -> Arc<ContainerDefinition> {
        self.definition.read().clone()
    }

    pub fn child(&self, key: &str) -> Option<PropertyNode> {
        self.children.read().get(key).cloned()
    }

    /// Child keys in definition order.
    pub fn keys(&self) -> Vec<String> {
        self.definition
            .read()
            .children
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Descend a dot-separated path. `None` if any segment is missing or an
    /// intermediate segment names a leaf.
    pub fn get(&self, path: &str) -> Option<PropertyNode> {
        let segments: SmallVec<&str, 4> = path.split('.').collect();
        let (last, parents) = segments.split_last()?;

        let mut current: Option<Arc<PropertyContainer>> = None;
        for segment in parents {
            let next = match &current {
                Some(container) => container.child(segment),
                None => self.child(segment),
            };
            current = Some(next?.try_as_container()?);
        }

        match current {
            Some(container) => container.child(last),
            None => self.child(last),
        }
    }

    /// Leaf property at `path`.
    pub fn property(&self, path: &str) -> Option<Arc<Property>> {
        self.get(path)?.try_as_leaf()
    }

    pub fn collapsed(&self) -> Option<bool> {
        *self.collapsed.read()
    }

    pub fn set_collapsed(&self, collapsed: Option<bool>) {
        *self.collapsed.write() = collapsed;
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed()
            .unwrap_or_else(|| self.definition.read().collapsed_by_default)
    }

    /// Bring the live subtree in line with `definition`.
    ///
    /// Nodes whose definition kept its shape are preserved (same `Arc`), nodes
    /// whose definition disappeared are cleaned up, and nodes that switched
    /// between leaf and group are rebuilt.
    pub fn reconcile(
        &self,
        definition: Arc<ContainerDefinition>,
        prefix: &str,
        on_created: CreatedHook<'_>,
    ) {
        let mut children = self.children.write();

        children.retain(|key, node| {
            let keep = definition.contains(key);
            if !keep {
                debug!("Removing stale property node `{}`", join_path(prefix, key));
                node.cleanup();
            }
            keep
        });

        for (key, child_def) in &definition.children {
            let path = join_path(prefix, key);
            match (children.get(key).cloned(), child_def) {
                (Some(PropertyNode::Leaf(prop)), PropertyDefinition::Single(single)) => {
                    prop.set_definition(single.clone());
                }
                (Some(PropertyNode::Container(group)), PropertyDefinition::Container(inner)) => {
                    group.reconcile(inner.clone(), &path, on_created);
                }
                (existing, _) => {
                    if let Some(old) = existing {
                        debug!(
                            "Property node `{}` changed shape, rebuilding it as a {}",
                            path,
                            if child_def.is_container() { "group" } else { "property" }
                        );
                        old.cleanup();
                    }
                    children.insert(key.clone(), PropertyNode::build(child_def, &path, on_created));
                }
            }
        }

        drop(children);
        *self.definition.write() = definition;
    }

    /// Minimal snapshot of the subtree, or `None` when every child is in its
    /// default state and the collapsed flag matches the definition.
    pub fn to_snapshot(&self) -> Option<ContainerSnapshot> {
        let collapsed_default = self.definition.read().collapsed_by_default;
        let collapsed = self.collapsed().filter(|c| *c != collapsed_default);

        let children: BTreeMap<_, _> = self
            .children
            .read()
            .iter()
            .filter(|(_, node)| !node.is_default_state())
            .filter_map(|(key, node)| Some((key.clone(), node.to_snapshot()?)))
            .collect();

        if children.is_empty() && collapsed.is_none() {
            return None;
        }
        Some(ContainerSnapshot {
            collapsed,
            children,
        })
    }

    /// Apply a snapshot to the subtree.
    ///
    /// Keys unknown to the current definitions and shape mismatches are skipped
    /// and reported; they never abort the rest of the patch.
    pub fn apply_snapshot(
        &self,
        snapshot: &ContainerSnapshot,
        mode: SnapshotMode,
        prefix: &str,
    ) -> Vec<Error> {
        let mut issues = Vec::new();
        let mut nested = Vec::new();

        if mode.is_replace() || snapshot.collapsed.is_some() {
            self.set_collapsed(snapshot.collapsed);
        }

        let children: Vec<(String, PropertyNode)> = self
            .children
            .read()
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();

        for (key, node) in &children {
            let path = join_path(prefix, key);
            match snapshot.children.get(key) {
                Some(child) if node.is_container() && child.is_container() => {
                    nested.extend(node.apply_snapshot(child, mode, &path))
                }
                Some(child) => issues.extend(node.apply_snapshot(child, mode, &path)),
                None if mode.is_replace() => node.reset_to_default(),
                None => {}
            }
        }

        for key in snapshot.children.keys() {
            if !children.iter().any(|(k, _)| k == key) {
                issues.push(Error::UnknownPath(join_path(prefix, key)));
            }
        }

        for issue in &issues {
            warn!("Ignoring part of a property snapshot: {issue}");
        }
        issues.extend(nested);
        issues
    }

    pub fn reset_to_default(&self) {
        self.set_collapsed(None);
        for node in self.children.read().values() {
            node.reset_to_default();
        }
    }

    pub fn is_default_state(&self) -> bool {
        self.collapsed().is_none_or(|c| c == self.definition.read().collapsed_by_default)
            && self
                .children
                .read()
                .values()
                .all(PropertyNode::is_default_state)
    }

    pub fn cleanup(&self) {
        for node in self.children.read().values() {
            node.cleanup();
        }
    }
}
