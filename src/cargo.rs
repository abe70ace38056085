use std::env;
use std::io::BufReader;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use cargo_metadata::camino::Utf8PathBuf;
use cargo_metadata::{Artifact, CargoOpt, Message, Metadata, MetadataCommand};
use clap::ArgMatches;

use crate::action::Verbosity;

/// Which of the built artifacts is the firmware
#[derive(Debug, PartialEq, Eq)]
pub enum BuildType<'a> {
    Any,
    Bin(&'a str),
    Example(&'a str),
}

impl<'a> BuildType<'a> {
    fn matches(&self, artifact: &Artifact) -> bool {
        match self {
            BuildType::Bin(target_name) => {
                artifact.target.kind.iter().any(|s| s == "bin")
                    && artifact.target.name == *target_name
            }
            BuildType::Example(target_name) => {
                artifact.target.kind.iter().any(|s| s == "example")
                    && artifact.target.name == *target_name
            }
            BuildType::Any => artifact.executable.is_some(),
        }
    }
}

pub fn metadata(matches: &ArgMatches) -> Result<Metadata> {
    let mut metadata_command = MetadataCommand::new();

    if let Some(features) = matches.get_many::<String>("features") {
        metadata_command.features(CargoOpt::SomeFeatures(
            features.map(|s| s.to_owned()).collect(),
        ));
    }
    if matches.get_flag("no-default-features") {
        metadata_command.features(CargoOpt::NoDefaultFeatures);
    }
    if matches.get_flag("all-features") {
        metadata_command.features(CargoOpt::AllFeatures);
    }

    let metadata = metadata_command
        .exec()
        .context("reading the Cargo project metadata")?;

    if metadata.workspace_members.is_empty() {
        bail!("Unable to find workspace members");
    }

    Ok(metadata)
}

/// Runs `cargo build` and returns the path of the linked executable
pub fn build(matches: &ArgMatches, metadata: &Metadata, verbosity: Verbosity) -> Result<Utf8PathBuf> {
    let cargo = env::var_os("CARGO").unwrap_or_else(|| "cargo".into());
    let mut cargo = Command::new(cargo);
    cargo.arg("build");

    let build_type = build_args(matches, verbosity, &mut cargo);

    cargo.arg("--message-format=json-diagnostic-rendered-ansi");
    cargo.stdout(Stdio::piped());

    if verbosity.verbose > 0 {
        eprintln!("{cargo:?}");
    }

    let mut child = cargo.spawn().context("failed to execute cargo")?;
    let stdout = BufReader::new(child.stdout.take().expect("Pipe to cargo process failed"));

    // Note: We call `collect` to ensure we don't block stdout which could prevent the process from exiting
    let messages = Message::parse_stream(stdout).collect::<Vec<_>>();

    let status = child.wait()?;
    if !status.success() {
        bail!("`cargo build` failed with {status}");
    }

    let mut target_artifact: Option<Artifact> = None;
    for message in messages {
        match message? {
            Message::CompilerArtifact(artifact) => {
                if metadata.workspace_members.contains(&artifact.package_id)
                    && build_type.matches(&artifact)
                {
                    if target_artifact.is_some() {
                        bail!("Can only have one matching artifact but found several; pick one with `--bin` or `--example`");
                    }

                    target_artifact = Some(artifact);
                }
            }
            Message::CompilerMessage(msg) => {
                if !verbosity.quiet || verbosity.verbose > 1 {
                    if let Some(rendered) = msg.message.rendered {
                        eprint!("{rendered}");
                    }
                }
            }
            _ => (),
        }
    }

    let artifact = match target_artifact {
        Some(artifact) => artifact,
        None => bail!("Could not determine the wanted artifact"),
    };

    match artifact.executable {
        Some(executable) => Ok(executable),
        None => bail!("`{}` did not produce an executable", artifact.target.name),
    }
}

fn build_args<'a>(matches: &'a ArgMatches, verbosity: Verbosity, cargo: &mut Command) -> BuildType<'a> {
    if verbosity.quiet {
        cargo.arg("--quiet");
    }

    if let Some(package) = matches.get_one::<String>("package") {
        cargo.args(["--package", package.as_str()]);
    }

    let build_type = if let Some(bin) = matches.get_one::<String>("bin") {
        cargo.args(["--bin", bin.as_str()]);
        BuildType::Bin(bin)
    } else if let Some(example) = matches.get_one::<String>("example") {
        cargo.args(["--example", example.as_str()]);
        BuildType::Example(example)
    } else {
        BuildType::Any
    };

    if matches.get_flag("release") {
        cargo.arg("--release");
    }

    if let Some(profile) = matches.get_one::<String>("profile") {
        cargo.arg(format!("--profile={profile}"));
    }

    if let Some(target) = matches.get_one::<String>("target") {
        cargo.args(["--target", target.as_str()]);
    }

    if let Some(features) = matches.get_many::<String>("features") {
        let features: Vec<&str> = features.map(|s| s.as_str()).collect();
        cargo.arg("--features").arg(features.join(","));
    }
    if matches.get_flag("no-default-features") {
        cargo.arg("--no-default-features");
    }
    if matches.get_flag("all-features") {
        cargo.arg("--all-features");
    }

    if verbosity.verbose > 1 {
        cargo.arg(format!("-{}", "v".repeat((verbosity.verbose - 1) as usize)));
    }

    build_type
}
