//! Concurrency primitive (component J, object-pipe half): a
//! single-producer-many-generators FIFO of host values with an explicit
//! `close()` that unblocks any reader iterating it, plus the plain OS byte
//! pipe the process executor and `PipeNativeToNativeTask` use for the `ST`
//! side of a pipe edge.

use std::collections::VecDeque;
use std::fs::File;
use std::os::fd::FromRawFd;
use std::sync::{Arc, Condvar, Mutex};

use crate::value::Value;

type Generator = Box<dyn Iterator<Item = Value> + Send>;

struct PyPipeState {
    queue: VecDeque<Generator>,
    closed: bool,
}

/// An in-process FIFO of host-value generators. The reader drains queued
/// generators in the order they were pushed; it blocks for more only while
/// the pipe is not yet closed.
pub struct PyPipe {
    state: Mutex<PyPipeState>,
    cv: Condvar,
}

impl PyPipe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(PyPipeState { queue: VecDeque::new(), closed: false }), cv: Condvar::new() })
    }

    /// Enqueues one producer's output. May be called by multiple
    /// producers; a reader drains them sequentially in queue order.
    pub fn push(&self, generator: Generator) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(generator);
        self.cv.notify_all();
    }

    /// Marks the pipe closed. A reader unblocks once every queued
    /// generator has also been fully drained.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.cv.notify_all();
    }

    fn next_value(&self) -> Option<Value> {
        let mut state = self.state.lock().unwrap();
        loop {
            while let Some(front) = state.queue.front_mut() {
                if let Some(v) = front.next() {
                    return Some(v);
                }
                state.queue.pop_front();
            }
            if state.closed {
                return None;
            }
            state = self.cv.wait(state).unwrap();
        }
    }
}

/// A reader handle over a shared `PyPipe`. Cloning shares the exact same
/// underlying queue (the same way two `dup`'d file descriptors share one
/// pipe's byte stream), so sequential consumers -- e.g. both sides of a
/// `;`/`&&`/`||` fed by the same object pipe -- see a single continuous
/// stream rather than each getting their own copy.
#[derive(Clone)]
pub struct PyPipeReader {
    pipe: Arc<PyPipe>,
}

impl PyPipeReader {
    pub fn new(pipe: Arc<PyPipe>) -> Self {
        Self { pipe }
    }
}

impl Iterator for PyPipeReader {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.pipe.next_value()
    }
}

/// Creates a connected pair of `File`s backed by a real OS pipe
/// (`(read_end, write_end)`), used for the `ST` transport between two
/// pipeline stages and for pyout-redirect capture. `O_CLOEXEC` is set so
/// the ends don't leak into children beyond the one explicit `dup2` the
/// process executor performs.
pub fn os_pipe() -> std::io::Result<(File, File)> {
    let mut fds = [0i32; 2];
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    unsafe { Ok((File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1]))) }
}
