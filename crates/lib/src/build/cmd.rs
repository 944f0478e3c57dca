//! Shell command execution inside a build environment.

use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::build::BuildEnv;

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("command failed: {cmd} (exit code: {code:?})")]
  Failed { cmd: String, code: Option<i32> },

  #[error("failed to spawn `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },
}

/// Run `cmd` with `/bin/sh -e -c` in `env.cwd`, with `env.vars` set on top of
/// the inherited environment.
///
/// When `verbose` is false the output is captured and only logged at debug
/// level if the command fails.
pub fn run_shell(cmd: &str, env: &BuildEnv, verbose: bool) -> Result<(), CmdError> {
  info!(cmd = %cmd, cwd = %env.cwd.display(), "executing command");

  let mut command = Command::new("/bin/sh");
  command
    .arg("-e")
    .arg("-c")
    .arg(cmd)
    .current_dir(&env.cwd)
    .envs(&env.vars)
    .stdin(Stdio::null());

  let spawn_err = |source| CmdError::Spawn {
    cmd: cmd.to_string(),
    source,
  };

  let status = if verbose {
    command.status().map_err(spawn_err)?
  } else {
    let output = command.output().map_err(spawn_err)?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let stdout = String::from_utf8_lossy(&output.stdout);
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command stdout");
      }
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
    }
    output.status
  };

  if !status.success() {
    return Err(CmdError::Failed {
      cmd: cmd.to_string(),
      code: status.code(),
    });
  }

  Ok(())
}

/// Quote `arg` for `/bin/sh` unless it only contains safe characters.
pub fn shell_quote(arg: &str) -> String {
  let safe = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ',' | ':' | '+' | '@'));
  if safe {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}
