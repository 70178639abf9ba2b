//! External tool resolution: find an executable once, run it many times.
//!
//! The rasterizer and compressor are plain executables. Each is located a
//! single time when the [`crate::talk::Pipeline`] is assembled (explicit
//! override first, then `PATH`), and the resolved path is reused for every
//! page and every talk. A missing tool is not an error at resolution time:
//! a batch where every talk is already current never needs it. The error
//! surfaces at the first invocation instead.

use crate::error::ToolError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// A resolved (or known-missing) external executable.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: &'static str,
    program: Option<PathBuf>,
    install_hint: &'static str,
}

impl ExternalTool {
    /// Resolve `name`, preferring an explicit override path.
    pub fn resolve(
        name: &'static str,
        override_path: Option<&Path>,
        install_hint: &'static str,
    ) -> Self {
        let program = match override_path {
            Some(p) => Some(p.to_path_buf()),
            None => find_on_path(name),
        };
        match &program {
            Some(p) => debug!("Resolved {} → {}", name, p.display()),
            None => debug!("{} not found on PATH", name),
        }
        Self {
            name,
            program,
            install_hint,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The executable path, or `ToolError::NotFound`.
    pub fn program(&self) -> Result<&Path, ToolError> {
        self.program.as_deref().ok_or_else(|| ToolError::NotFound {
            tool: self.name.to_string(),
            hint: self.install_hint.to_string(),
        })
    }

    /// Run the tool and return its raw output, whatever the exit status.
    ///
    /// `input` is only used to label errors.
    pub fn output<I, S>(&self, args: I, input: &Path) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self.program()?;
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotFound {
                        tool: self.name.to_string(),
                        hint: format!("'{}' does not exist. {}", program.display(), self.install_hint),
                    }
                } else {
                    ToolError::Spawn {
                        tool: self.name.to_string(),
                        input: input.to_path_buf(),
                        detail: e.to_string(),
                    }
                }
            })
    }

    /// Run the tool and require a zero exit status.
    pub fn run<I, S>(&self, args: I, input: &Path) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(args, input)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(self.failure(input, &output))
        }
    }

    /// Build the `ToolError::Failed` for a finished, unsuccessful run.
    pub fn failure(&self, input: &Path, output: &Output) -> ToolError {
        ToolError::Failed {
            tool: self.name.to_string(),
            input: input.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Search `PATH` for an executable file called `name`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
