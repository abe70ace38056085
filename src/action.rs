use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::{self, Command};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::build_env::BuildEnv;
use crate::objcopy::{self, Format};
use crate::version;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Raw binary image for the flasher
    ToBin,
    /// Intel HEX image
    ToHex,
    /// Versioned copy of the Intel HEX image in the project directory
    CopyHex,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::ToBin => "tobin",
            Action::ToHex => "tohex",
            Action::CopyHex => "copyhex",
        }
    }

    pub fn about(self) -> &'static str {
        match self {
            Action::ToBin => {
                "Converts the linked firmware into a raw binary image, dropping the `.eeprom` section."
            }
            Action::ToHex => {
                "Converts the linked firmware into an Intel HEX image, dropping the `.eeprom` section."
            }
            Action::CopyHex => {
                "Copies the Intel HEX image into the project directory under a versioned name."
            }
        }
    }

    /// Target this action runs after
    pub fn source(self) -> &'static str {
        match self {
            Action::ToBin | Action::ToHex => "$PROG_PATH",
            Action::CopyHex => "$BUILD_DIR/${PROGNAME}.hex",
        }
    }

    /// Build target this action writes, if other actions may hang off it
    pub fn produces(self) -> Option<&'static str> {
        match self {
            Action::ToBin => Some("$BUILD_DIR/${PROGNAME}.bin"),
            Action::ToHex => Some("$BUILD_DIR/${PROGNAME}.hex"),
            Action::CopyHex => None,
        }
    }

    /// Runs the action and returns the exit code of the tool it drives
    pub fn exec(self, env: &BuildEnv, verbosity: Verbosity) -> Result<i32> {
        match self {
            Action::ToBin => convert(env, Format::Binary, verbosity),
            Action::ToHex => convert(env, Format::Ihex, verbosity),
            Action::CopyHex => copy_hex(env, verbosity),
        }
    }

    /// Parses arguments for `cargo $action`, builds the project if needed and
    /// then runs the action.
    /// Errors exit with status code 101 the same as if the process had a panic!
    pub fn cargo_exec(self) -> ! {
        let matches = crate::args(Some(self));

        match crate::run(Some(self), matches) {
            Err(e) => {
                eprintln!("error: {e:#}");
                process::exit(101)
            }
            Ok(ec) => process::exit(ec),
        }
    }
}

/// How much the actions tell about what they do
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Verbosity {
    pub quiet: bool,
    pub verbose: u8,
}

impl Verbosity {
    /// Prints `description`, or the whole command line when verbose
    fn announce(self, command: &Command, description: &str) {
        if self.verbose > 0 {
            eprintln!("{command:?}");
        } else if !self.quiet {
            eprintln!("{description}");
        }
    }

    fn status(self, msg: fmt::Arguments) {
        if !self.quiet {
            eprintln!("{msg}");
        }
    }
}

fn convert(env: &BuildEnv, format: Format, verbosity: Verbosity) -> Result<i32> {
    let program = env.subst("$OBJCOPY")?;
    let input = env.subst("$PROG_PATH")?;
    let output = env.subst(&format!("$BUILD_DIR/${{PROGNAME}}.{}", format.extension()))?;

    let mut objcopy = objcopy::convert(&program, format, &input, &output);

    verbosity.announce(&objcopy, &format!("Building {output}"));

    // the input is not checked here; a missing ELF is reported by objcopy itself
    let status = objcopy
        .status()
        .with_context(|| format!("failed to execute `{program}`"))?;

    if status.success() {
        Ok(0)
    } else {
        Ok(status.code().unwrap_or(101))
    }
}

// Never fails the build: every problem here is reported and skipped
fn copy_hex(env: &BuildEnv, verbosity: Verbosity) -> Result<i32> {
    if let Err(e) = try_copy_hex(env, verbosity) {
        eprintln!("error: copying hex file: {e:#}");
    }

    Ok(0)
}

fn try_copy_hex(env: &BuildEnv, verbosity: Verbosity) -> Result<()> {
    let header = env.subst("$VERSION_HEADER")?;

    let version = match fs::read_to_string(&header) {
        Ok(text) => version::firmware_version(&text)
            .unwrap_or(version::UNKNOWN)
            .to_owned(),
        Err(e) => {
            eprintln!("warning: could not read version from {header}: {e}");
            version::UNKNOWN.to_owned()
        }
    };

    let mut env = env.clone();
    env.set("VERSION", version);

    let source = env.subst("$BUILD_DIR/${PROGNAME}.hex")?;
    let dest = env.subst("$HEX_DEST")?;

    let source = Path::new(&source);
    let dest = Path::new(&dest);

    if !source.exists() {
        eprintln!("warning: source hex file not found: {}", source.display());
        return Ok(());
    }

    // copying a file onto itself truncates it
    if let (Ok(s), Ok(d)) = (source.canonicalize(), dest.canonicalize()) {
        if s == d {
            eprintln!(
                "warning: {} is already the destination of the copy; skipping",
                source.display()
            );
            return Ok(());
        }
    }

    fs::copy(source, dest)
        .with_context(|| format!("{} to {}", source.display(), dest.display()))?;

    if let Err(e) = copy_mtime(source, dest) {
        eprintln!("warning: could not preserve the modification time of {}: {e}", dest.display());
    }

    verbosity.status(format_args!(
        "Copied {} to {}",
        file_name(source),
        file_name(dest)
    ));

    Ok(())
}

fn copy_mtime(source: &Path, dest: &Path) -> io::Result<()> {
    let modified = fs::metadata(source)?.modified()?;

    File::options().write(true).open(dest)?.set_modified(modified)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
