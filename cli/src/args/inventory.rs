use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Args;
use melanite::inventory;
use melanite::inventory::MemoryInventory;
use melanite::util::dirs;

const HEADING: Option<&str> = Some("Inventory Options");

/// Arguments for locating the inventory.
#[derive(Debug, Args, Clone)]
pub struct InventoryArgs {
    /// Inventory file listing nodes and groups, as JSON
    #[clap(long, env = "MELANITE_INVENTORY", default_value_t = default_inventory(), help_heading = HEADING)]
    pub inventory: Utf8PathBuf,
}

impl InventoryArgs {
    pub async fn load(&self) -> Result<MemoryInventory> {
        inventory::load(&self.inventory).await
    }
}

fn default_inventory() -> Utf8PathBuf {
    dirs::config_dir("melanite").join("inventory.json")
}
