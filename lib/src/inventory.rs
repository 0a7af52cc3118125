//! Nodes, groups and the read-only lookup capability over them.

mod file;
mod memory;

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use redact::Secret;
use serde::Deserialize;

pub use self::file::load;
pub use self::file::parse;
pub use self::file::InventoryDocument;
pub use self::memory::MemoryInventory;
use crate::error::Result;

/// Default SSH port used when a node does not specify one.
pub const DEFAULT_PORT: u16 = 22;

/// Read-only lookup over groups and nodes.
///
/// Implementations must be pure: the same arguments against unchanged
/// inventory data yield the same groups in the same order.
pub trait Inventory {
    /// Returns the selected group (with its members, in declared order)
    /// followed by a single-member group for the selected node.
    ///
    /// # Errors
    ///
    /// - [`crate::error::Error::NotFound`] if a named group or node is absent.
    fn filter_groups_and_nodes(&self, group: Option<&str>, node: Option<&str>)
        -> Result<Vec<Group>>;
}

impl<T> Inventory for Arc<T>
where
    T: Inventory + ?Sized,
{
    fn filter_groups_and_nodes(
        &self,
        group: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<Group>> {
        (**self).filter_groups_and_nodes(group, node)
    }
}

/// One remote host plus its connection and auth parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    password: Option<Secret<String>>,
    #[serde(default)]
    key_path: Option<Utf8PathBuf>,
}

/// Constructors
impl Node {
    /// Creates a node on the default port, logging in as the invoking user and
    /// with no credential configured.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            user: default_user(),
            password: None,
            key_path: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    #[must_use]
    pub fn with_key_path(mut self, key_path: impl Into<Utf8PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }
}

/// Accessors
impl Node {
    /// Password, if one is configured and non-empty.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password
            .as_ref()
            .map(|x| x.expose_secret().as_str())
            .filter(|x| !x.is_empty())
    }

    /// Private key path, if one is configured and non-empty.
    #[must_use]
    pub fn key_path(&self) -> Option<&Utf8Path> {
        self.key_path
            .as_deref()
            .filter(|x| !x.as_str().is_empty())
    }

    /// Whether any credential is configured. Says nothing about whether it
    /// works.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.password().is_some() || self.key_path().is_some()
    }

    /// `host:port`, suitable for dialing and for error messages.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Two nodes are the same target when name and host match.
    #[must_use]
    pub fn same_target(&self, other: &Node) -> bool {
        self.name == other.name && self.host == other.host
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}@{})", self.name, self.user, self.address())
    }
}

/// Named collection of node references.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub nodes: Vec<Arc<Node>>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user() -> String {
    whoami::username()
}
