//! Process executor (component H): forks external commands, plumbs
//! redirections, and manages the capture pipes `=> name` needs.
//!
//! Re-expressed with `std::process::Command` +
//! `std::os::unix::process::CommandExt::pre_exec` instead of a raw
//! `fork()`/`execvp()` pair: the redirect dup2/open dance the original
//! performs between `fork()` and `exec()` happens in the same place here,
//! inside a `pre_exec` closure that runs in the child after the fork and
//! before the exec.

use std::fs::File;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use crate::error::ShellError;
use crate::resources::{open_redirect_file, ResourceTable};

use super::pipe::os_pipe;

/// One already fd/path-resolved redirect, built from a diagnosed
/// `LabelledRedirect` plus its evaluated target.
pub enum RedirectKind {
    /// `n>&m` / `n>>&m`.
    Dup { dst_fd: i32 },
    /// `n>file` / `n>>file`, with the target path already evaluated.
    File { path: String, append: bool },
    /// `=> name`, rewritten at parse time into `(append=false, src=1, ...)`.
    PyOut { var_name: String },
}

pub struct RedirectSpec {
    pub src_fd: i32,
    pub kind: RedirectKind,
}

enum ResolvedOp {
    Dup { src_fd: i32, dst_fd: i32 },
    DupFile { src_fd: i32, file: File },
}

#[derive(Debug)]
pub struct SpawnedExternal {
    pub child: Child,
    pub pid: i32,
    /// Read end of each pyout redirect's pipe, paired with the capture
    /// name it targets. The caller spawns a `WriteToPyOutThread` on each.
    pub pyout_reads: Vec<(String, File)>,
}

/// Forks (via `Command::spawn`) and execs `argv`, applying `redirects` in
/// the order given -- spec.md 6 requires this so e.g. `2>&1` applies
/// *after* any preceding `1>file` has already repointed fd 1.
pub fn spawn_external(
    argv: &[String],
    redirects: Vec<RedirectSpec>,
    stdin: Stdio,
    stdout: Stdio,
    resources: &ResourceTable,
) -> Result<SpawnedExternal, ShellError> {
    let (program, args) = argv.split_first().ok_or_else(|| ShellError::exec("empty argv"))?;

    let mut command = Command::new(program);
    command.args(args);
    command.stdin(stdin);
    command.stdout(stdout);
    command.stderr(Stdio::inherit());

    let mut resolved = Vec::with_capacity(redirects.len());
    let mut pyout_reads = Vec::new();
    for r in redirects {
        match r.kind {
            RedirectKind::Dup { dst_fd } => resolved.push(ResolvedOp::Dup { src_fd: r.src_fd, dst_fd }),
            RedirectKind::File { path, append } => {
                let file = open_redirect_file(&path, append)?;
                resources.track(&file)?;
                resolved.push(ResolvedOp::DupFile { src_fd: r.src_fd, file });
            }
            RedirectKind::PyOut { var_name } => {
                let (read_end, write_end) = os_pipe().map_err(ShellError::from)?;
                pyout_reads.push((var_name, read_end));
                resolved.push(ResolvedOp::DupFile { src_fd: r.src_fd, file: write_end });
            }
        }
    }

    // SAFETY: the closure only calls `dup2`, both async-signal-safe, and
    // does not allocate -- every path/fd it needs was resolved beforehand.
    unsafe {
        command.pre_exec(move || {
            use std::os::fd::AsRawFd;
            for op in &resolved {
                let rc = match op {
                    ResolvedOp::Dup { src_fd, dst_fd } => libc::dup2(*dst_fd, *src_fd),
                    ResolvedOp::DupFile { src_fd, file } => libc::dup2(file.as_raw_fd(), *src_fd),
                };
                if rc < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| ShellError::exec(format!("{}: {e}", program)))?;
    let pid = child.id() as i32;
    // Drops this process's own copy of every `File` captured by the
    // pre_exec closure (in particular pyout write ends), so the
    // corresponding read end sees EOF once the child's dup'd copy closes
    // at process exit instead of staying open forever.
    drop(command);

    Ok(SpawnedExternal { child, pid, pyout_reads })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn file_redirect_writes_stdout_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let argv = vec!["echo".to_string(), "foo".to_string(), "bar".to_string()];
        let redirects = vec![RedirectSpec {
            src_fd: 1,
            kind: RedirectKind::File { path: out_path.to_str().unwrap().to_string(), append: false },
        }];
        let resources = ResourceTable::new();
        let mut spawned = spawn_external(&argv, redirects, Stdio::null(), Stdio::inherit(), &resources).unwrap();
        let status = spawned.child.wait().unwrap();
        assert!(status.success());
        let mut contents = String::new();
        File::open(&out_path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "foo bar\n");
        assert_eq!(resources.open_count(), 1);
    }

    #[test]
    fn pyout_redirect_pipe_delivers_lines() {
        let argv = vec!["printf".to_string(), "a\\nb\\n".to_string()];
        let redirects = vec![RedirectSpec { src_fd: 1, kind: RedirectKind::PyOut { var_name: "out".to_string() } }];
        let resources = ResourceTable::new();
        let mut spawned = spawn_external(&argv, redirects, Stdio::null(), Stdio::inherit(), &resources).unwrap();
        let (name, mut read_end) = spawned.pyout_reads.pop().unwrap();
        assert_eq!(name, "out");
        let status = spawned.child.wait().unwrap();
        assert!(status.success());
        let mut contents = String::new();
        read_end.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "a\nb\n");
    }

    #[test]
    fn dup_redirect_merges_stderr_into_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let argv = vec!["sh".to_string(), "-c".to_string(), "echo out; echo err 1>&2".to_string()];
        let redirects = vec![
            RedirectSpec {
                src_fd: 1,
                kind: RedirectKind::File { path: out_path.to_str().unwrap().to_string(), append: false },
            },
            RedirectSpec { src_fd: 2, kind: RedirectKind::Dup { dst_fd: 1 } },
        ];
        let resources = ResourceTable::new();
        let mut spawned = spawn_external(&argv, redirects, Stdio::null(), Stdio::inherit(), &resources).unwrap();
        spawned.child.wait().unwrap();
        let mut contents = String::new();
        File::open(&out_path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "out\nerr\n");
    }

    #[test]
    fn spawn_failure_is_reported_not_panicking() {
        let argv = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let resources = ResourceTable::new();
        let err = spawn_external(&argv, Vec::new(), Stdio::null(), Stdio::null(), &resources).unwrap_err();
        assert!(matches!(err, ShellError::Exec { .. }));
    }

    #[test]
    fn append_writes_after_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        std::fs::write(&out_path, "first\n").unwrap();
        let argv = vec!["echo".to_string(), "second".to_string()];
        let redirects = vec![RedirectSpec {
            src_fd: 1,
            kind: RedirectKind::File { path: out_path.to_str().unwrap().to_string(), append: true },
        }];
        let resources = ResourceTable::new();
        let mut spawned = spawn_external(&argv, redirects, Stdio::null(), Stdio::inherit(), &resources).unwrap();
        spawned.child.wait().unwrap();
        let mut contents = String::new();
        File::open(&out_path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        let _ = Write::flush(&mut std::io::sink());
    }
}
