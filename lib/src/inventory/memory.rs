use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Entity;
use crate::error::Error;
use crate::error::Result;
use crate::inventory::Group;
use crate::inventory::Inventory;
use crate::inventory::Node;

/// Inventory held entirely in memory.
///
/// Groups reference nodes by name. Member order is preserved exactly as
/// declared, including repeated entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryInventory {
    nodes: Vec<Arc<Node>>,
    node_index: HashMap<String, usize>,
    groups: Vec<GroupEntry>,
    group_index: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
struct GroupEntry {
    name: String,
    members: Vec<usize>,
}

impl MemoryInventory {
    /// Builds an inventory from nodes and `(group, member names)` pairs.
    ///
    /// # Errors
    ///
    /// - If two nodes or two groups share a name
    /// - If a group references a node that is not defined
    pub fn try_new<G, M>(nodes: impl IntoIterator<Item = Node>, groups: G) -> Result<Self>
    where
        G: IntoIterator<Item = (String, M)>,
        M: IntoIterator<Item = String>,
    {
        let mut inventory = Self::default();

        for node in nodes {
            if inventory.node_index.contains_key(&node.name) {
                return Err(Error::InvalidInventory(format!(
                    "node defined more than once: {}",
                    node.name
                )));
            }
            inventory
                .node_index
                .insert(node.name.clone(), inventory.nodes.len());
            inventory.nodes.push(Arc::new(node));
        }

        for (name, members) in groups {
            if inventory.group_index.contains_key(&name) {
                return Err(Error::InvalidInventory(format!(
                    "group defined more than once: {name}"
                )));
            }
            let members = members
                .into_iter()
                .map(|member| {
                    inventory.node_index.get(&member).copied().ok_or_else(|| {
                        Error::InvalidInventory(format!(
                            "group {name} references undefined node: {member}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            inventory
                .group_index
                .insert(name.clone(), inventory.groups.len());
            inventory.groups.push(GroupEntry { name, members });
        }

        Ok(inventory)
    }

    /// All nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// All groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.groups.iter().map(|x| self.materialize(x)).collect()
    }

    /// Name of the first group listing `node`, if any.
    #[must_use]
    pub fn first_group_of(&self, node: &str) -> Option<&str> {
        let index = *self.node_index.get(node)?;
        self.groups
            .iter()
            .find(|x| x.members.contains(&index))
            .map(|x| x.name.as_str())
    }

    fn materialize(&self, entry: &GroupEntry) -> Group {
        Group {
            name: entry.name.clone(),
            nodes: entry
                .members
                .iter()
                .map(|&i| Arc::clone(&self.nodes[i]))
                .collect(),
        }
    }
}

impl Inventory for MemoryInventory {
    fn filter_groups_and_nodes(
        &self,
        group: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<Group>> {
        let mut groups = Vec::new();

        if let Some(name) = group.filter(|x| !x.is_empty()) {
            let index = self.group_index.get(name).ok_or_else(|| Error::NotFound {
                entity: Entity::Group,
                name: name.to_owned(),
            })?;
            groups.push(self.materialize(&self.groups[*index]));
        }

        if let Some(name) = node.filter(|x| !x.is_empty()) {
            let index = self.node_index.get(name).ok_or_else(|| Error::NotFound {
                entity: Entity::Node,
                name: name.to_owned(),
            })?;
            groups.push(Group {
                name: self.first_group_of(name).unwrap_or_default().to_owned(),
                nodes: vec![Arc::clone(&self.nodes[*index])],
            });
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fixture() -> MemoryInventory {
        let nodes = ["web1", "web2", "db1", "lone"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| Node::new(name, format!("10.0.0.{}", i + 1)));
        let groups = [
            ("web", vec!["web1", "web2"]),
            ("db", vec!["db1"]),
            ("all", vec!["web1", "web2", "db1"]),
        ]
        .into_iter()
        .map(|(g, m)| (g.to_owned(), m.into_iter().map(str::to_owned)));
        MemoryInventory::try_new(nodes, groups).unwrap()
    }

    fn names(groups: &[Group]) -> Vec<(String, Vec<String>)> {
        groups
            .iter()
            .map(|g| {
                let nodes = g.nodes.iter().map(|n| n.name.clone()).collect();
                (g.name.clone(), nodes)
            })
            .collect()
    }

    #[test]
    fn group_only() {
        let groups = fixture().filter_groups_and_nodes(Some("web"), None).unwrap();
        assert_eq!(
            names(&groups),
            vec![("web".into(), vec!["web1".into(), "web2".into()])]
        );
    }

    #[rstest]
    #[case("db1", "db")]
    #[case("web2", "web")]
    #[case("lone", "")]
    fn node_only_is_labelled_with_first_group(#[case] node: &str, #[case] group: &str) {
        let groups = fixture().filter_groups_and_nodes(None, Some(node)).unwrap();
        assert_eq!(names(&groups), vec![(group.into(), vec![node.into()])]);
    }

    #[test]
    fn group_and_node_returns_both() {
        let groups = fixture()
            .filter_groups_and_nodes(Some("db"), Some("web1"))
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "db");
        assert_eq!(groups[1].nodes[0].name, "web1");
    }

    #[rstest]
    #[case(Some("nope"), None, Entity::Group)]
    #[case(None, Some("nope"), Entity::Node)]
    #[case(Some("web"), Some("nope"), Entity::Node)]
    fn unknown_names_are_not_found(
        #[case] group: Option<&str>,
        #[case] node: Option<&str>,
        #[case] should: Entity,
    ) {
        let error = fixture().filter_groups_and_nodes(group, node).unwrap_err();
        assert!(matches!(error, Error::NotFound { entity, .. } if entity == should));
    }

    #[test]
    fn empty_names_are_ignored() {
        let groups = fixture().filter_groups_and_nodes(Some(""), Some("")).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn undefined_member_is_rejected() {
        let nodes = vec![Node::new("a", "10.0.0.1")];
        let groups = vec![("g".to_owned(), vec!["a".to_owned(), "b".to_owned()])];
        let error = MemoryInventory::try_new(nodes, groups).unwrap_err();
        assert!(error.to_string().contains("undefined node: b"));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let nodes = vec![Node::new("a", "10.0.0.1"), Node::new("a", "10.0.0.2")];
        let groups: Vec<(String, Vec<String>)> = Vec::new();
        assert!(MemoryInventory::try_new(nodes, groups).is_err());
    }

    #[test]
    fn repeated_members_are_preserved() {
        let nodes = vec![Node::new("a", "10.0.0.1")];
        let groups = vec![("g".to_owned(), vec!["a".to_owned(), "a".to_owned()])];
        let inventory = MemoryInventory::try_new(nodes, groups).unwrap();
        assert_eq!(inventory.groups()[0].nodes.len(), 2);
    }
}
