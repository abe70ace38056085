use std::env;
use std::env::consts::EXE_SUFFIX;
use std::ffi::OsStr;
use std::process::Command;

use crate::rustc::rustlib;

/// Section holding EEPROM initial values; never part of a flash image
pub const EEPROM_SECTION: &str = ".eeprom";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Binary,
    Ihex,
}

impl Format {
    /// Argument to `-O`
    pub fn bfd_name(self) -> &'static str {
        match self {
            Format::Binary => "binary",
            Format::Ihex => "ihex",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Binary => "bin",
            Format::Ihex => "hex",
        }
    }
}

/// `$objcopy -O $format -R .eeprom $input $output`
pub fn convert<P, I, O>(objcopy: P, format: Format, input: I, output: O) -> Command
where
    P: AsRef<OsStr>,
    I: AsRef<OsStr>,
    O: AsRef<OsStr>,
{
    let mut c = Command::new(objcopy);
    c.args(["-O", format.bfd_name(), "-R", EEPROM_SECTION])
        .arg(input)
        .arg(output);
    c
}

/// Picks the objcopy to use when the build configuration doesn't name one
///
/// The `OBJCOPY` environment variable wins, then `llvm-objcopy` from the Rust
/// toolchain if the `llvm-tools` component is installed, then plain `objcopy`
/// from `PATH`.
pub fn locate() -> String {
    if let Some(objcopy) = env::var_os("OBJCOPY").filter(|v| !v.is_empty()) {
        return objcopy.to_string_lossy().into_owned();
    }

    if let Ok(mut path) = rustlib() {
        path.push(format!("llvm-objcopy{EXE_SUFFIX}"));

        if path.exists() {
            return path.display().to_string();
        }
    }

    format!("objcopy{EXE_SUFFIX}")
}
