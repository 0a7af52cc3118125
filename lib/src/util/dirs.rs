//! Default config and data storage paths.
//!
//! Follows these rules:
//!
//! - XDG base directory (all platforms if environment variable is set)
//! - Platform-specific well known directory (see [`dirs`])
//! - Home directory, as a dotted directory
//! - Current directory, as a dotted directory

use std::env;
use std::path::PathBuf;

use camino::Utf8PathBuf;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Config,
    Data,
}

impl Kind {
    fn xdg_var(self) -> &'static str {
        match self {
            Kind::Config => "XDG_CONFIG_HOME",
            Kind::Data => "XDG_DATA_HOME",
        }
    }

    fn platform_dir(self) -> Option<PathBuf> {
        match self {
            Kind::Config => dirs::config_dir(),
            Kind::Data => dirs::data_dir(),
        }
    }
}

/// Gets the config directory. Does not create it.
///
/// # Panics
///
/// If none of the rules succeeds, or the path is not UTF-8.
#[must_use]
pub fn config_dir(name: &str) -> Utf8PathBuf {
    app_dir(Kind::Config, name)
}

/// Gets the data directory. Creates it if it does not exist.
///
/// # Panics
///
/// If none of the rules succeeds, the path is not UTF-8, or it cannot be
/// created.
#[must_use]
pub fn data_dir(name: &str) -> Utf8PathBuf {
    let dir = app_dir(Kind::Data, name);
    std::fs::create_dir_all(&dir).expect("unable to ensure data dir exists");
    dir
}

fn app_dir(kind: Kind, name: &str) -> Utf8PathBuf {
    let dir = if let Ok(path) = env::var(kind.xdg_var()) {
        PathBuf::from(path).join(name)
    } else if let Some(path) = kind.platform_dir() {
        path.join(name)
    } else if let Some(path) = dirs::home_dir() {
        path.join(format!(".{name}"))
    } else if let Ok(path) = env::current_dir() {
        path.join(format!(".{name}"))
    } else {
        panic!("all sources for {kind:?} dir failed");
    };
    Utf8PathBuf::from_path_buf(dir).expect("app dir is not valid UTF-8")
}
