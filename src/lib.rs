//! Post-link hooks for firmware builds
//!
//! After the linker produces the firmware ELF these tools run the object-copy
//! utility on it to produce the images that actually get flashed: a raw `.bin`
//! and an Intel `.hex`, both without the `.eeprom` section. They work either
//! as Cargo subcommands (building the project first) or as hooks called by
//! another build system that passes its build directory.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};

pub use crate::action::{Action, Verbosity};
pub use crate::config::Config;
pub use crate::build_env::BuildEnv;
pub use crate::objcopy::Format;
pub use crate::pipeline::Pipeline;

mod action;
mod build_env;
mod cargo;
mod config;
mod objcopy;
mod pipeline;
mod rustc;
mod util;
mod version;

const AFTER_HELP: &str = "\
Without `--build-dir` (or `build-dir` in Postbuild.toml) the Cargo project in the current directory \
is built first and the linked executable it produces is used as the firmware ELF.

Build variables (`$BUILD_DIR`, `${PROGNAME}`, `$PROG_PATH`, `$OBJCOPY`, `$PROJECT_DIR`, \
`$VERSION_HEADER`, `$HEX_NAME`, `$HEX_DEST`) can be overridden with `-D NAME=VALUE`.";

pub fn app(action: Option<Action>) -> ClapCommand {
    let (name, about) = match action {
        Some(action) => (format!("cargo-{}", action.name()), action.about()),
        None => (
            "cargo-postbuild".to_owned(),
            "Runs the post-link actions configured in Postbuild.toml on the firmware.",
        ),
    };

    ClapCommand::new(name)
        .about(about)
        .version(clap::crate_version!())
        .dont_collapse_args_in_usage(true)
        // as this is used as a Cargo subcommand the first argument will be the name of the binary
        // we ignore this argument
        .arg(Arg::new("binary-name").hide(true))
        .arg(
            Arg::new("build-dir")
                .long("build-dir")
                .num_args(1)
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory holding the linked firmware; skips `cargo build`"),
        )
        .arg(
            Arg::new("progname")
                .long("progname")
                .num_args(1)
                .value_name("NAME")
                .help("File name of the firmware without extension [default: firmware]"),
        )
        .arg(
            Arg::new("objcopy")
                .long("objcopy")
                .num_args(1)
                .value_name("PATH")
                .help("Object-copy tool to run"),
        )
        .arg(
            Arg::new("project-dir")
                .long("project-dir")
                .num_args(1)
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Project root, where versioned copies are written"),
        )
        .arg(
            Arg::new("define")
                .long("define")
                .short('D')
                .num_args(1)
                .value_name("NAME=VALUE")
                .action(ArgAction::Append)
                .help("Set a build variable"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Don't print build output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Use verbose output (-vv very verbose output)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("package")
                .long("package")
                .short('p')
                .num_args(1)
                .value_name("SPEC")
                .help("Package to build"),
        )
        .arg(
            Arg::new("bin")
                .long("bin")
                .num_args(1)
                .value_name("NAME")
                .help("Build only the specified binary"),
        )
        .arg(
            Arg::new("example")
                .long("example")
                .num_args(1)
                .value_name("NAME")
                .conflicts_with("bin")
                .help("Build only the specified example"),
        )
        .arg(
            Arg::new("release")
                .long("release")
                .help("Build artifacts in release mode, with optimizations")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .num_args(1)
                .value_name("PROFILE-NAME")
                .conflicts_with("release")
                .help("Build artifacts with the specified profile"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .num_args(1)
                .value_name("TRIPLE")
                .help("Target triple for which the code is compiled"),
        )
        .arg(
            Arg::new("features")
                .long("features")
                .short('F')
                .num_args(1)
                .value_name("FEATURES")
                .action(ArgAction::Append)
                .help("Space or comma separated list of features to activate"),
        )
        .arg(
            Arg::new("all-features")
                .long("all-features")
                .help("Activate all available features")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-default-features")
                .long("no-default-features")
                .help("Do not activate the `default` feature")
                .action(ArgAction::SetTrue),
        )
        .after_help(AFTER_HELP)
}

pub fn args(action: Option<Action>) -> ArgMatches {
    app(action).get_matches()
}

/// Runs `action`, or the configured pipeline when `None`, and returns the
/// exit code of the failing tool or 0
pub fn run(action: Option<Action>, matches: ArgMatches) -> Result<i32> {
    let verbosity = Verbosity {
        quiet: matches.get_flag("quiet"),
        verbose: matches.get_count("verbose"),
    };

    let cwd = env::current_dir()?;
    let (root, config) = match Config::get(&cwd)? {
        Some((root, config)) => (Some(root), config),
        None => (None, Config::default()),
    };

    let env = build_env(&matches, &config, root.as_deref(), &cwd, verbosity)?;

    match action {
        Some(action) => action.exec(&env, verbosity),
        None => Pipeline::with_actions(&config.actions()).run(&env, "$PROG_PATH", verbosity),
    }
}

/// Assembles the build variables from the command line, `Postbuild.toml` and,
/// when no build directory is known, a `cargo build` of the current project
fn build_env(
    matches: &ArgMatches,
    config: &Config,
    root: Option<&Path>,
    cwd: &Path,
    verbosity: Verbosity,
) -> Result<BuildEnv> {
    let mut env = BuildEnv::new();
    let build = config.build.as_ref();

    let build_dir = matches
        .get_one::<PathBuf>("build-dir")
        .cloned()
        .or_else(|| {
            build
                .and_then(|b| b.build_dir.as_ref())
                .map(|dir| root.unwrap_or(cwd).join(dir))
        });

    let defines = defines(matches)?;
    let defined = |var: &str| defines.iter().any(|(name, _)| *name == var);

    let mut project_dir = root.unwrap_or(cwd).to_owned();

    let cargo_mode = build_dir.is_none() && !defined("BUILD_DIR");

    if let Some(build_dir) = build_dir {
        env.set("BUILD_DIR", build_dir.display().to_string());
    }

    if cargo_mode {
        let metadata = cargo::metadata(matches)?;
        let executable = cargo::build(matches, &metadata, verbosity)?;

        let (dir, progname) = match (executable.parent(), executable.file_stem()) {
            (Some(dir), Some(stem)) => (dir, stem),
            _ => bail!("unexpected executable path `{executable}`"),
        };

        env.set("BUILD_DIR", dir.as_str());
        env.set("PROGNAME", progname);
        env.set("PROG_PATH", executable.as_str());

        if root.is_none() {
            project_dir = metadata.workspace_root.clone().into_std_path_buf();
        }
    } else if let Some(progname) = build.and_then(|b| b.progname.as_ref()) {
        env.set("PROGNAME", progname);
    }

    if let Some(progname) = matches.get_one::<String>("progname") {
        env.set("PROGNAME", progname);
    }

    if let Some(project) = matches.get_one::<PathBuf>("project-dir") {
        project_dir = project.clone();
    }
    env.set("PROJECT_DIR", project_dir.display().to_string());

    if let Some(copyhex) = config.copyhex.as_ref() {
        if let Some(header) = &copyhex.version_header {
            env.set("VERSION_HEADER", header);
        }
        if let Some(name) = &copyhex.name {
            env.set("HEX_NAME", name);
        }
    }

    if !defined("OBJCOPY") {
        let program = matches
            .get_one::<String>("objcopy")
            .or_else(|| build.and_then(|b| b.objcopy.as_ref()))
            .cloned()
            .unwrap_or_else(objcopy::locate);
        env.set("OBJCOPY", program);
    }

    for (name, value) in defines {
        env.set(name, value);
    }

    Ok(env)
}

fn defines(matches: &ArgMatches) -> Result<Vec<(&str, &str)>> {
    let mut defines = vec![];

    for define in matches.get_many::<String>("define").into_iter().flatten() {
        match define.split_once('=') {
            Some((name, value)) if !name.is_empty() => defines.push((name, value)),
            _ => bail!("invalid `--define {define}`: expected NAME=VALUE"),
        }
    }

    Ok(defines)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{app, build_env, defines, Action, Config, Verbosity};

    #[test]
    fn defines_parse() {
        let matches = app(None).get_matches_from([
            "cargo-postbuild",
            "-D",
            "OBJCOPY=llvm-objcopy",
            "--define",
            "HEX_NAME=fw=${VERSION}.hex",
        ]);

        assert_eq!(
            defines(&matches).unwrap(),
            [
                ("OBJCOPY", "llvm-objcopy"),
                ("HEX_NAME", "fw=${VERSION}.hex")
            ]
        );
    }

    #[test]
    fn defines_invalid() {
        let matches = app(None).get_matches_from(["cargo-postbuild", "-D", "OBJCOPY"]);

        assert!(defines(&matches).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn flags_override_config() {
        let config: Config = toml::from_str(
            r#"
[build]
build-dir = ".pio/build/teensy41"
progname = "aio"
objcopy = "arm-none-eabi-objcopy"

[copyhex]
name = "AiO_New_Dawn_v${VERSION}.hex"
"#,
        )
        .unwrap();
        let matches = app(Some(Action::ToBin)).get_matches_from([
            "cargo-tobin",
            "tobin",
            "--objcopy",
            "llvm-objcopy",
        ]);

        let env = build_env(
            &matches,
            &config,
            Some(Path::new("/work/aio")),
            Path::new("/work/aio/src"),
            Verbosity::default(),
        )
        .unwrap();

        assert_eq!(
            env.subst("$PROG_PATH").unwrap(),
            "/work/aio/.pio/build/teensy41/aio.elf"
        );
        assert_eq!(env.subst("$OBJCOPY").unwrap(), "llvm-objcopy");
        assert_eq!(env.subst("$PROJECT_DIR").unwrap(), "/work/aio");
        assert_eq!(env.get("HEX_NAME"), Some("AiO_New_Dawn_v${VERSION}.hex"));
    }

    #[test]
    fn config_progname_with_defined_build_dir() {
        let config: Config = toml::from_str("[build]\nprogname = \"aio\"").unwrap();
        let matches = app(None).get_matches_from([
            "cargo-postbuild",
            "-D",
            "BUILD_DIR=out",
            "-D",
            "OBJCOPY=objcopy",
        ]);

        let env = build_env(
            &matches,
            &config,
            None,
            Path::new("/work"),
            Verbosity::default(),
        )
        .unwrap();

        assert_eq!(env.subst("$PROG_PATH").unwrap(), "out/aio.elf");
    }

    #[test]
    fn build_dir_flag() {
        let matches = app(None).get_matches_from([
            "cargo-postbuild",
            "--build-dir",
            "out",
            "--progname",
            "aio",
            "-D",
            "OBJCOPY=objcopy",
        ]);

        let env = build_env(
            &matches,
            &Config::default(),
            None,
            Path::new("/work"),
            Verbosity::default(),
        )
        .unwrap();

        assert_eq!(env.subst("$BUILD_DIR/${PROGNAME}.bin").unwrap(), "out/aio.bin");
        assert_eq!(env.subst("$PROJECT_DIR").unwrap(), "/work");
    }
}
