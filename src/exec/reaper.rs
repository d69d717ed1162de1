//! Single global child reaper (component J): one process-wide daemon
//! thread owns `wait()` for every child the engine spawns, dispatching
//! exit events to whichever callback is registered for that pid.
//!
//! `std::process::Child::wait` cannot wait on an arbitrary pid, so this
//! calls `libc::waitpid(-1, ...)` directly on a dedicated thread, matching
//! pysh's `os.wait()` loop in `executeAst`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use crate::value::ExitStatus;

type Callback = Box<dyn FnOnce(ExitStatus) + Send>;

#[derive(Default)]
struct ReaperState {
    callbacks: HashMap<i32, Callback>,
    /// Exit statuses observed before a callback was registered for that
    /// pid -- can happen if the child exits between fork and the parent
    /// finishing registration.
    pending_exits: HashMap<i32, ExitStatus>,
}

pub struct Reaper {
    state: Mutex<ReaperState>,
}

impl Reaper {
    fn new() -> Self {
        Self { state: Mutex::new(ReaperState::default()) }
    }

    /// Registers a callback for `pid`'s exit. If the child already exited
    /// and is sitting in `pending_exits`, the callback fires immediately
    /// (synchronously, on the calling thread) instead of being stored.
    pub fn register(&self, pid: i32, callback: Callback) {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.pending_exits.remove(&pid) {
            drop(state);
            callback(status);
        } else {
            state.callbacks.insert(pid, callback);
        }
    }

    fn on_child_exited(&self, pid: i32, status: ExitStatus) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            match state.callbacks.remove(&pid) {
                Some(cb) => Some(cb),
                None => {
                    state.pending_exits.insert(pid, status);
                    None
                }
            }
        };
        if let Some(cb) = callback {
            cb(status);
        }
    }
}

fn decode_wait_status(status: i32) -> ExitStatus {
    unsafe {
        if libc::WIFEXITED(status) {
            ExitStatus::from_code(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            ExitStatus::from_signal(libc::WTERMSIG(status))
        } else {
            ExitStatus::from_code(-1)
        }
    }
}

fn reaper_loop(reaper: &'static Reaper) {
    loop {
        let mut status: i32 = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, 0) };
        if pid > 0 {
            reaper.on_child_exited(pid, decode_wait_status(status));
        } else {
            // No children currently registered with the kernel (ECHILD) or
            // a transient interruption (EINTR): back off briefly rather
            // than spinning.
            thread::sleep(Duration::from_millis(5));
        }
    }
}

static REAPER: OnceLock<&'static Reaper> = OnceLock::new();

/// Returns the process-wide reaper, lazily creating its daemon thread on
/// first call. Every `run()` call shares this single instance.
pub fn global() -> &'static Reaper {
    REAPER.get_or_init(|| {
        let reaper: &'static Reaper = Box::leak(Box::new(Reaper::new()));
        thread::Builder::new()
            .name("hybrid-shell-reaper".into())
            .spawn(move || reaper_loop(reaper))
            .expect("failed to spawn child reaper thread");
        reaper
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn registered_callback_fires_on_exit() {
        let (tx, rx) = mpsc::channel();
        let mut child = std::process::Command::new("true").spawn().expect("spawn true");
        let pid = child.id() as i32;
        global().register(
            pid,
            Box::new(move |status| {
                tx.send(status).unwrap();
            }),
        );
        let status = rx.recv_timeout(Duration::from_secs(5)).expect("reaper callback did not fire");
        assert!(status.success());
        let _ = child.try_wait();
    }

    #[test]
    fn late_registration_after_exit_still_fires() {
        let mut child = std::process::Command::new("true").spawn().expect("spawn true");
        let pid = child.id() as i32;
        // give the reaper thread a chance to observe the exit first
        thread::sleep(Duration::from_millis(100));
        let (tx, rx) = mpsc::channel();
        global().register(
            pid,
            Box::new(move |status| {
                tx.send(status).unwrap();
            }),
        );
        let status = rx.recv_timeout(Duration::from_secs(5)).expect("late registration did not fire");
        assert!(status.success());
        let _ = child.try_wait();
    }
}
