use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Search for `file` in `path` and its parent directories
pub fn search<'p>(mut path: &'p Path, file: &str) -> Option<&'p Path> {
    loop {
        if path.join(file).exists() {
            return Some(path);
        }

        if let Some(p) = path.parent() {
            path = p;
        } else {
            return None;
        }
    }
}

pub fn parse<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}
