//! Argument-list command templates.
//!
//! External tools are configured as a program plus arguments, each of which
//! may contain `{name}` placeholders. Substitution happens per argument, so a
//! path with spaces stays one argument and nothing is ever passed to a shell.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::process::Command;

/// A configured external command such as `["feh", "--quiet", "{path}"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute placeholders and produce a launchable spec.
    ///
    /// Unknown placeholders are left untouched. Returns `None` for an empty
    /// template.
    pub fn render(&self, vars: &[(&str, &str)]) -> Option<LaunchSpec> {
        let (program, args) = self.0.split_first()?;
        Some(LaunchSpec {
            program: substitute(program, vars),
            args: args.iter().map(|a| substitute(a, vars)).collect(),
        })
    }
}

fn substitute(part: &str, vars: &[(&str, &str)]) -> String {
    let mut out = part.to_string();
    for (name, value) in vars {
        let key = format!("{{{}}}", name);
        if out.contains(&key) {
            out = out.replace(&key, value);
        }
    }
    out
}

/// A fully rendered command: what to run and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(OsString::from));
        cmd
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
