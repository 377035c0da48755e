//! The native execution strategy: write the rendered assembly to a scratch
//! directory, assemble with `as`, link with `gcc` (or `cc`), execute the
//! binary and capture its output.
//!
//! Every artifact lives in a per-run unique directory owned by a drop guard,
//! so all exit paths – assembler failure, link failure, timeout, panic –
//! clean up, unless the caller asked to keep the files. Every child process
//! runs under a bounded timeout and is killed on overrun. A failed spawn is
//! retried once; a non-zero tool exit is deterministic and is not.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use snafu::ResultExt;
use tracing::{debug, warn};

use crate::codegen::Arch;
use crate::error::{SpawnSnafu, ToolMissingSnafu, ToolchainError, WriteArtifactSnafu};
use crate::runner::{RunOptions, RunResult};

/// Where the export surface put its outputs.
#[derive(Debug, Clone)]
pub struct BuildReport {
  pub asm_path: PathBuf,
  pub bin_path: Option<PathBuf>,
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Scratch directory for one run. Removed on drop unless `keep` is set;
/// named from the process id plus a counter so concurrent runs never collide.
struct Workspace {
  dir: PathBuf,
  keep: bool,
}

impl Workspace {
  fn create(keep: bool) -> Result<Self, ToolchainError> {
    let dir = std::env::temp_dir().join(format!(
      "piperc-{}-{}",
      std::process::id(),
      RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&dir).context(WriteArtifactSnafu { path: dir.clone() })?;
    Ok(Self { dir, keep })
  }

  fn path(&self, name: &str) -> PathBuf {
    self.dir.join(name)
  }
}

impl Drop for Workspace {
  fn drop(&mut self) {
    if self.keep {
      debug!(dir = %self.dir.display(), "keeping native artifacts");
      return;
    }
    if let Err(err) = fs::remove_dir_all(&self.dir) {
      warn!(dir = %self.dir.display(), %err, "failed to remove scratch directory");
    }
  }
}

/// Assemble, link and execute `asm`, capturing stdout and the exit code.
pub fn run_native(asm: &str, arch: Arch, options: &RunOptions) -> Result<RunResult, ToolchainError> {
  let workspace = Workspace::create(options.keep_artifacts)?;
  let asm_path = workspace.path("program.s");
  fs::write(&asm_path, asm).context(WriteArtifactSnafu {
    path: asm_path.clone(),
  })?;

  let bin_path = workspace.path("program");
  assemble_and_link(&asm_path, &bin_path, arch, options.timeout)?;

  let output = run_command(
    Command::new(&bin_path),
    "compiled program",
    options.timeout,
  )?;
  Ok(RunResult {
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    exit_code: output.exit_code,
    trace: Vec::new(),
  })
}

/// The export surface: write the assembly to `asm_path` and, when `bin_path`
/// is given, produce a native binary there as well.
pub fn build_executable(
  asm: &str,
  arch: Arch,
  asm_path: &Path,
  bin_path: Option<&Path>,
  options: &RunOptions,
) -> Result<BuildReport, ToolchainError> {
  fs::write(asm_path, asm).context(WriteArtifactSnafu {
    path: asm_path.to_path_buf(),
  })?;
  debug!(path = %asm_path.display(), "wrote assembly");

  let bin_path = match bin_path {
    Some(path) => path,
    None => {
      return Ok(BuildReport {
        asm_path: asm_path.to_path_buf(),
        bin_path: None,
      });
    }
  };

  assemble_and_link(asm_path, bin_path, arch, options.timeout)?;
  Ok(BuildReport {
    asm_path: asm_path.to_path_buf(),
    bin_path: Some(bin_path.to_path_buf()),
  })
}

fn assemble_and_link(
  asm_path: &Path,
  bin_path: &Path,
  arch: Arch,
  timeout: Duration,
) -> Result<(), ToolchainError> {
  let assembler = which::which("as").context(ToolMissingSnafu { tool: "as" })?;
  let obj_path = bin_path.with_extension("o");

  let mut assemble = Command::new(&assembler);
  match arch {
    Arch::X86_64 => {
      assemble.arg("--64");
    }
    Arch::X86 => {
      assemble.arg("--32");
    }
    Arch::Arm => {}
  }
  assemble.arg("-o").arg(&obj_path).arg(asm_path);
  let output = run_command(assemble, "assembler", timeout)?;
  if output.exit_code != 0 {
    return Err(ToolchainError::AssemblerFailed {
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    });
  }

  let linker = which::which("gcc")
    .or_else(|_| which::which("cc"))
    .context(ToolMissingSnafu { tool: "gcc" })?;
  let mut link = Command::new(&linker);
  if arch == Arch::X86 {
    link.arg("-m32");
  }
  // The emitted code talks to the kernel directly, so PIE buys nothing and
  // 32-bit absolute relocations would not link under it.
  link.arg("-no-pie").arg(&obj_path).arg("-o").arg(bin_path);
  let output = run_command(link, "linker", timeout);
  let _ = fs::remove_file(&obj_path);
  let output = output?;
  if output.exit_code != 0 {
    return Err(ToolchainError::LinkerFailed {
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    });
  }

  Ok(())
}

#[derive(Debug)]
struct CommandOutput {
  exit_code: i32,
  stdout: Vec<u8>,
  stderr: Vec<u8>,
}

/// Run one child process with captured output and a hard deadline. Kills
/// and reports `Timeout` on overrun. Spawning is retried once.
fn run_command(
  mut command: Command,
  what: &str,
  timeout: Duration,
) -> Result<CommandOutput, ToolchainError> {
  command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
  debug!(%what, ?command, "spawning");

  let mut child = match command.spawn() {
    Ok(child) => child,
    Err(err) => {
      warn!(%what, %err, "spawn failed, retrying once");
      command.spawn().context(SpawnSnafu { what })?
    }
  };

  let stdout_reader = drain(child.stdout.take());
  let stderr_reader = drain(child.stderr.take());

  let deadline = Instant::now() + timeout;
  let status = loop {
    match child.try_wait().context(SpawnSnafu { what })? {
      Some(status) => break status,
      None if Instant::now() >= deadline => {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ToolchainError::Timeout {
          what: what.to_string(),
          limit: timeout,
        });
      }
      None => thread::sleep(Duration::from_millis(10)),
    }
  };

  Ok(CommandOutput {
    exit_code: status.code().unwrap_or(-1),
    stdout: stdout_reader.join().unwrap_or_default(),
    stderr: stderr_reader.join().unwrap_or_default(),
  })
}

/// Read a child pipe to the end on a helper thread, so a chatty child can
/// never fill the pipe and deadlock against `try_wait`.
fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<Vec<u8>> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn workspaces_are_unique_and_removed_on_drop() {
    let first = Workspace::create(false).unwrap();
    let second = Workspace::create(false).unwrap();
    assert_ne!(first.dir, second.dir);
    let dir = first.dir.clone();
    assert!(dir.is_dir());
    drop(first);
    assert!(!dir.exists());
    drop(second);
  }

  #[test]
  fn kept_workspaces_survive_drop() {
    let workspace = Workspace::create(true).unwrap();
    let dir = workspace.dir.clone();
    drop(workspace);
    assert!(dir.is_dir());
    fs::remove_dir_all(dir).unwrap();
  }

  #[cfg(unix)]
  #[test]
  fn overrunning_children_time_out() {
    let mut command = Command::new("sleep");
    command.arg("5");
    let err = run_command(command, "compiled program", Duration::from_millis(100)).unwrap_err();
    assert!(matches!(err, ToolchainError::Timeout { .. }));
  }

  #[cfg(unix)]
  #[test]
  fn captured_output_and_exit_codes_come_back() {
    let mut command = Command::new("sh");
    command.arg("-c").arg("echo out; exit 3");
    let output = run_command(command, "compiled program", Duration::from_secs(5)).unwrap();
    assert_eq!(output.exit_code, 3);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
  }
}
