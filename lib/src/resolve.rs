//! Turns a group/node selector into an ordered, deduplicated target list.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bon::Builder;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;
use crate::inventory::Inventory;
use crate::inventory::Node;

/// Identity commands run as when the operator does not pick one.
pub const DEFAULT_RUN_AS: &str = "root";

/// Operator-supplied description of what to run and where.
#[derive(Debug, Clone, Builder)]
pub struct Selector {
    #[builder(into)]
    pub group: Option<String>,
    #[builder(into)]
    pub node: Option<String>,
    #[builder(into)]
    pub command: String,
    #[builder(into, default = DEFAULT_RUN_AS.to_owned())]
    pub run_as: String,
}

impl Selector {
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref().filter(|x| !x.is_empty())
    }

    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref().filter(|x| !x.is_empty())
    }

    /// User to run as, falling back to [`DEFAULT_RUN_AS`] when blank.
    #[must_use]
    pub fn run_as(&self) -> &str {
        match self.run_as.trim() {
            "" => DEFAULT_RUN_AS,
            user => user,
        }
    }

    /// Checks the selector before any resolution or network activity.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSelector`] if neither group nor node is named
    /// - [`Error::MissingCommand`] if the command is blank
    pub fn validate(&self) -> Result<()> {
        if self.group().is_none() && self.node().is_none() {
            return Err(Error::MissingSelector);
        }
        if self.command.trim().is_empty() {
            return Err(Error::MissingCommand);
        }
        Ok(())
    }
}

/// Resolved node together with the group it was selected through.
#[derive(Debug, Clone)]
pub struct Target {
    pub group: String,
    pub node: Arc<Node>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.node.name)
        } else {
            write!(f, "{}/{}", self.group, self.node.name)
        }
    }
}

/// Resolves selectors against an injected [`Inventory`].
#[derive(Clone)]
pub struct Resolver {
    inventory: Arc<dyn Inventory + Send + Sync>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish()
    }
}

impl Resolver {
    pub fn new(inventory: Arc<dyn Inventory + Send + Sync>) -> Self {
        Self { inventory }
    }

    /// Resolves a validated selector into targets.
    ///
    /// Group members come first, in declared order, followed by the explicit
    /// node. Nodes are deduplicated by name and host, keeping the first
    /// occurrence.
    ///
    /// # Errors
    ///
    /// - If the selector fails [`Selector::validate`]
    /// - If the inventory does not know a named group or node
    pub fn resolve(&self, selector: &Selector) -> Result<Vec<Target>> {
        selector.validate()?;
        let groups = self
            .inventory
            .filter_groups_and_nodes(selector.group(), selector.node())?;

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for group in groups {
            for node in group.nodes {
                if !seen.insert((node.name.clone(), node.host.clone())) {
                    debug!(node = %node.name, group = %group.name, "skipping duplicate target");
                    continue;
                }
                targets.push(Target {
                    group: group.name.clone(),
                    node,
                });
            }
        }

        debug!(count = targets.len(), "resolved targets");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use rstest::rstest;

    use super::*;
    use crate::inventory::Group;
    use crate::inventory::MemoryInventory;

    fn inventory() -> MemoryInventory {
        let nodes = ["a", "b", "c", "x"]
            .into_iter()
            .map(|name| Node::new(name, format!("{name}.example.com")));
        let groups = vec![
            ("g".to_owned(), vec!["a", "b", "c"]),
            ("dup".to_owned(), vec!["a", "b", "a", "c", "b"]),
        ]
        .into_iter()
        .map(|(g, m)| (g, m.into_iter().map(str::to_owned)));
        MemoryInventory::try_new(nodes, groups).unwrap()
    }

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(inventory()))
    }

    fn selector(group: Option<&str>, node: Option<&str>) -> Selector {
        Selector::builder()
            .maybe_group(group)
            .maybe_node(node)
            .command("uptime")
            .build()
    }

    fn names(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.node.name.as_str()).collect()
    }

    /// Inventory that counts lookups, to prove validation happens first.
    #[derive(Default)]
    struct CountingInventory(AtomicUsize);

    impl Inventory for CountingInventory {
        fn filter_groups_and_nodes(
            &self,
            _group: Option<&str>,
            _node: Option<&str>,
        ) -> Result<Vec<Group>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(""), None)]
    #[case(None, Some(""))]
    #[case(Some(""), Some(""))]
    fn missing_selector_fails_before_lookup(
        #[case] group: Option<&str>,
        #[case] node: Option<&str>,
    ) {
        let inventory = Arc::new(CountingInventory::default());
        let resolver = Resolver::new(inventory.clone());
        let error = resolver.resolve(&selector(group, node)).unwrap_err();
        assert!(matches!(error, Error::MissingSelector));
        assert_eq!(inventory.0.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn missing_command_fails(#[case] command: &str) {
        let selector = Selector::builder().group("g").command(command).build();
        let error = resolver().resolve(&selector).unwrap_err();
        assert!(matches!(error, Error::MissingCommand));
    }

    #[rstest]
    #[case(Some("g"), None, vec!["a", "b", "c"])]
    #[case(Some("dup"), None, vec!["a", "b", "c"])]
    #[case(Some("g"), Some("b"), vec!["a", "b", "c"])]
    #[case(Some("g"), Some("x"), vec!["a", "b", "c", "x"])]
    #[case(None, Some("x"), vec!["x"])]
    fn resolve_works(
        #[case] group: Option<&str>,
        #[case] node: Option<&str>,
        #[case] should: Vec<&str>,
    ) {
        let targets = resolver().resolve(&selector(group, node)).unwrap();
        assert_eq!(names(&targets), should);
    }

    #[test]
    fn explicit_node_outside_groups_is_unlabelled() {
        let targets = resolver().resolve(&selector(Some("g"), Some("x"))).unwrap();
        assert_eq!(targets[0].group, "g");
        assert_eq!(targets[3].group, "");
        assert_eq!(targets[3].to_string(), "x");
        assert_eq!(targets[0].to_string(), "g/a");
    }

    #[test]
    fn resolve_is_idempotent() {
        let resolver = resolver();
        let selector = selector(Some("dup"), Some("x"));
        let first = resolver.resolve(&selector).unwrap();
        let second = resolver.resolve(&selector).unwrap();
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn unknown_group_is_not_found() {
        let error = resolver()
            .resolve(&selector(Some("missing"), None))
            .unwrap_err();
        assert!(matches!(error, Error::NotFound { .. }));
    }

    #[rstest]
    #[case("", "root")]
    #[case("  ", "root")]
    #[case("deploy", "deploy")]
    fn run_as_defaults(#[case] run_as: &str, #[case] should: &str) {
        let selector = Selector::builder()
            .node("x")
            .command("id")
            .run_as(run_as)
            .build();
        assert_eq!(selector.run_as(), should);
    }
}
