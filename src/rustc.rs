use std::env;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Result};

/// `rustc --print sysroot`, honoring `$RUSTC`
pub fn sysroot() -> Result<String> {
    let rustc = env::var_os("RUSTC").unwrap_or_else(|| "rustc".into());
    let output = Command::new(rustc).arg("--print").arg("sysroot").output()?;

    if !output.status.success() {
        bail!("`rustc --print sysroot` exited with {}", output.status);
    }

    let sysroot = String::from_utf8(output.stdout)?;

    Ok(sysroot.trim().to_owned())
}

/// Directory where the `llvm-tools` component installs its binaries
pub fn rustlib() -> Result<PathBuf> {
    let mut path = PathBuf::from(sysroot()?);
    path.push("lib");
    path.push("rustlib");
    path.push(rustc_version::version_meta()?.host);
    path.push("bin");

    Ok(path)
}
