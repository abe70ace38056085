use std::collections::BTreeMap;

use anyhow::{bail, Result};

// A variable that expands into itself more than this many times is a cycle
const MAX_DEPTH: usize = 16;

/// Build-system variables shared by all post actions
///
/// Values are templates: they may reference other variables as `$NAME` or
/// `${NAME}` and are expanded when [`BuildEnv::subst`] is called.
#[derive(Clone, Debug)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl Default for BuildEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildEnv {
    pub fn new() -> Self {
        let mut env = BuildEnv {
            vars: BTreeMap::new(),
        };

        env.set("PROGNAME", "firmware");
        env.set("PROG_PATH", "$BUILD_DIR/${PROGNAME}.elf");
        env.set("VERSION_HEADER", "$PROJECT_DIR/lib/aio_system/Version.h");
        env.set("HEX_NAME", "${PROGNAME}_v${VERSION}.hex");
        env.set("HEX_DEST", "$PROJECT_DIR/$HEX_NAME");

        env
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Raw, unexpanded value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| &**s)
    }

    /// Expands every variable reference in `template`
    pub fn subst(&self, template: &str) -> Result<String> {
        self.expand(template, 0)
    }

    fn expand(&self, template: &str, depth: usize) -> Result<String> {
        if depth > MAX_DEPTH {
            bail!("build variable expansion is too deep in `{template}` (recursive definition?)");
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            let (name, tail) = if let Some(braced) = rest.strip_prefix('{') {
                match braced.find('}') {
                    Some(end) => (&braced[..end], &braced[end + 1..]),
                    None => bail!("unterminated `${{` in `{template}`"),
                }
            } else if let Some(tail) = rest.strip_prefix('$') {
                out.push('$');
                rest = tail;
                continue;
            } else {
                let end = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                (&rest[..end], &rest[end..])
            };

            if name.is_empty() {
                bail!("empty variable reference in `{template}`");
            }

            match self.vars.get(name) {
                Some(value) => out.push_str(&self.expand(value, depth + 1)?),
                None => bail!("undefined build variable `{name}` in `{template}`"),
            }

            rest = tail;
        }

        out.push_str(rest);

        Ok(out)
    }
}
