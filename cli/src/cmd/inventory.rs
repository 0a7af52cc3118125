use anyhow::Result;
use clap::Args;
use melanite::db::DbImpl;
use melanite::inventory::Group;
use melanite::inventory::Inventory;
use melanite::inventory::MemoryInventory;
use melanite::inventory::Node;
use tabled::settings::Style;
use tabled::Table;
use tabled::Tabled;

use crate::args::InventoryArgs;
use crate::cmd::Run;

/// List groups and nodes from the inventory
#[derive(Debug, Args)]
pub struct InventoryListArgs {
    /// Only list members of this group
    #[clap(short = 'g', long)]
    group: Option<String>,

    #[clap(flatten)]
    inventory_args: InventoryArgs,
}

impl Run for InventoryListArgs {
    async fn run(&self, _db: DbImpl) -> Result<()> {
        let inventory = self.inventory_args.load().await?;
        let rows = rows(&inventory, self.group.as_deref())?;
        println!("{}", Table::new(rows).with(Style::blank()));
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Tabled)]
struct Row {
    #[tabled(rename = "GROUP")]
    group: String,
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "USER")]
    user: String,
    #[tabled(rename = "AUTH")]
    auth: &'static str,
}

impl Row {
    fn new(group: &str, node: &Node) -> Self {
        let auth = match (node.key_path(), node.password()) {
            (Some(_), Some(_)) => "key+password",
            (Some(_), None) => "key",
            (None, Some(_)) => "password",
            (None, None) => "none",
        };
        Self {
            group: if group.is_empty() { "-".into() } else { group.into() },
            node: node.name.clone(),
            address: node.address(),
            user: node.user.clone(),
            auth,
        }
    }
}

fn rows(inventory: &MemoryInventory, group: Option<&str>) -> Result<Vec<Row>> {
    let groups: Vec<Group> = match group {
        Some(group) => inventory.filter_groups_and_nodes(Some(group), None)?,
        None => inventory.groups(),
    };

    let mut rows: Vec<Row> = groups
        .iter()
        .flat_map(|g| g.nodes.iter().map(|n| Row::new(&g.name, n)))
        .collect();

    if group.is_none() {
        rows.extend(
            inventory
                .nodes()
                .iter()
                .filter(|n| inventory.first_group_of(&n.name).is_none())
                .map(|n| Row::new("", n)),
        );
    }

    Ok(rows)
}
