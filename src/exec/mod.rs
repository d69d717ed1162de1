//! Execution engine: the process executor, the pycmd executor and its
//! object pipe, the byte<->object bridge threads, and the single global
//! child reaper -- everything `task::tasks` coordinates to actually run a
//! diagnosed tree.

pub mod bridge;
pub mod pipe;
pub mod process;
pub mod pycmd_exec;
pub mod reaper;
