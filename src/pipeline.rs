use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::action::{Action, Verbosity};
use crate::build_env::BuildEnv;

/// Actions attached to build targets
///
/// Targets are path templates expanded against the [`BuildEnv`] when the
/// pipeline runs, so `$BUILD_DIR/${PROGNAME}.hex` and the path it expands to
/// name the same target.
#[derive(Debug, Default)]
pub struct Pipeline {
    post_actions: Vec<(String, Action)>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches each action to the target it conventionally follows
    pub fn with_actions(actions: &[Action]) -> Self {
        let mut pipeline = Self::new();

        for &action in actions {
            pipeline.add_post_action(action.source(), action);
        }

        pipeline
    }

    pub fn add_post_action(&mut self, target: impl Into<String>, action: Action) {
        self.post_actions.push((target.into(), action));
    }

    /// Actions that run after `target` has been produced, in registration order
    pub fn post_actions(&self, env: &BuildEnv, target: &str) -> Result<Vec<Action>> {
        let target = env.subst(target)?;
        let mut actions = vec![];

        for (t, action) in &self.post_actions {
            if Path::new(&env.subst(t)?) == Path::new(&target) {
                actions.push(*action);
            }
        }

        Ok(actions)
    }

    /// Fires the post actions of `target`, then those of every target they
    /// produce. Targets with post actions that were not produced in this run
    /// but already exist on disk, such as a `.hex` written by the host build,
    /// are fired afterwards. Stops at the first action that exits with a
    /// non-zero code and returns it.
    pub fn run(&self, env: &BuildEnv, target: &str, verbosity: Verbosity) -> Result<i32> {
        let mut fired = vec![];

        let ec = self.fire(env, target, verbosity, 0, &mut fired)?;
        if ec != 0 {
            return Ok(ec);
        }

        for (t, action) in &self.post_actions {
            let path = PathBuf::from(env.subst(t)?);

            if fired.contains(&path) {
                continue;
            }

            if path.exists() {
                let ec = self.fire(env, t, verbosity, 0, &mut fired)?;
                if ec != 0 {
                    return Ok(ec);
                }
            } else {
                eprintln!(
                    "warning: `{}` skipped: nothing produced {}",
                    action.name(),
                    path.display()
                );
            }
        }

        Ok(0)
    }

    fn fire(
        &self,
        env: &BuildEnv,
        target: &str,
        verbosity: Verbosity,
        depth: usize,
        fired: &mut Vec<PathBuf>,
    ) -> Result<i32> {
        // every action produces a different file, so a chain can't be longer
        // than the number of registered actions
        if depth > self.post_actions.len() {
            bail!("post actions of `{target}` form a cycle");
        }

        fired.push(PathBuf::from(env.subst(target)?));

        for action in self.post_actions(env, target)? {
            let ec = action.exec(env, verbosity)?;

            if ec != 0 {
                return Ok(ec);
            }

            if let Some(produced) = action.produces() {
                let ec = self.fire(env, produced, verbosity, depth + 1, fired)?;

                if ec != 0 {
                    return Ok(ec);
                }
            }
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::Pipeline;
    use crate::build_env::BuildEnv;
    use crate::Action;

    fn env() -> BuildEnv {
        let mut env = BuildEnv::new();
        env.set("BUILD_DIR", ".pio/build/teensy41");
        env
    }

    #[test]
    fn attached_by_template_or_path() {
        let mut pipeline = Pipeline::new();
        pipeline.add_post_action("$BUILD_DIR/${PROGNAME}.elf", Action::ToBin);
        pipeline.add_post_action(".pio/build/teensy41/firmware.elf", Action::ToHex);
        pipeline.add_post_action("$BUILD_DIR/${PROGNAME}.hex", Action::CopyHex);

        assert_eq!(
            pipeline.post_actions(&env(), "$PROG_PATH").unwrap(),
            [Action::ToBin, Action::ToHex]
        );
        assert_eq!(
            pipeline
                .post_actions(&env(), ".pio/build/teensy41/firmware.hex")
                .unwrap(),
            [Action::CopyHex]
        );
        assert!(pipeline
            .post_actions(&env(), "$BUILD_DIR/${PROGNAME}.bin")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn with_actions() {
        let pipeline = Pipeline::with_actions(&[Action::CopyHex, Action::ToBin]);

        assert_eq!(
            pipeline.post_actions(&env(), "$PROG_PATH").unwrap(),
            [Action::ToBin]
        );
        assert_eq!(
            pipeline
                .post_actions(&env(), "$BUILD_DIR/${PROGNAME}.hex")
                .unwrap(),
            [Action::CopyHex]
        );
    }

    #[test]
    fn nothing_attached() {
        let pipeline = Pipeline::new();

        assert_eq!(pipeline.run(&env(), "$PROG_PATH", Default::default()).unwrap(), 0);
    }
}
