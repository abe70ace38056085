use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::{util, Action};

pub const FILE_NAME: &str = "Postbuild.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub build: Option<Build>,
    pub postbuild: Option<Postbuild>,
    pub copyhex: Option<CopyHex>,
}

impl Config {
    /// Finds the closest `Postbuild.toml` and returns the directory it lives in
    /// along with its contents
    pub fn get(cwd: &Path) -> Result<Option<(PathBuf, Self)>> {
        if let Some(root) = util::search(cwd, FILE_NAME) {
            let config = util::parse(&root.join(FILE_NAME))?;

            Ok(Some((root.to_owned(), config)))
        } else {
            Ok(None)
        }
    }

    /// Actions run by `cargo postbuild`
    pub fn actions(&self) -> Vec<Action> {
        self.postbuild
            .as_ref()
            .map(|p| p.actions.clone())
            .unwrap_or_else(|| vec![Action::ToBin])
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Build {
    pub build_dir: Option<PathBuf>,
    pub progname: Option<String>,
    pub objcopy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Postbuild {
    pub actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CopyHex {
    pub version_header: Option<String>,
    pub name: Option<String>,
}
