use anyhow::Context;
use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use crate::inventory::MemoryInventory;
use crate::inventory::Node;

/// On-disk inventory format.
///
/// ```json
/// {
///   "nodes": [
///     { "name": "web1", "host": "10.0.0.1", "user": "ops", "key_path": "~/.ssh/id_ed25519" },
///     { "name": "db1", "host": "10.0.0.9", "port": 2222, "password": "..." }
///   ],
///   "groups": [
///     { "name": "web", "nodes": ["web1"] }
///   ]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub groups: Vec<GroupDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDocument {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl TryFrom<InventoryDocument> for MemoryInventory {
    type Error = crate::error::Error;

    fn try_from(value: InventoryDocument) -> Result<Self, Self::Error> {
        let groups = value.groups.into_iter().map(|x| (x.name, x.nodes));
        MemoryInventory::try_new(value.nodes, groups)
    }
}

/// Parses an inventory from JSON text.
///
/// # Errors
///
/// - If the text is not a valid inventory document
/// - If the document is internally inconsistent
pub fn parse(text: &str) -> anyhow::Result<MemoryInventory> {
    let document: InventoryDocument =
        serde_json::from_str(text).context("unable to parse inventory")?;
    let inventory = MemoryInventory::try_from(document)?;
    Ok(inventory)
}

/// Loads an inventory from a JSON file.
///
/// # Errors
///
/// - If the file cannot be read
/// - If parsing fails, see [`parse`]
pub async fn load(path: &Utf8Path) -> anyhow::Result<MemoryInventory> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("unable to read inventory file: {path}"))?;
    let inventory = parse(&text).with_context(|| format!("inventory file: {path}"))?;
    debug!(
        %path,
        nodes = inventory.nodes().len(),
        groups = inventory.groups().len(),
        "loaded inventory"
    );
    Ok(inventory)
}
