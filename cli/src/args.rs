mod action;
mod global;
mod inventory;

pub use action::ActionArgs;
pub use global::GlobalArgs;
pub use inventory::InventoryArgs;
