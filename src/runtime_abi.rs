//! The fixed runtime surface emitted code relies on (spec.md §4.5 & §5).
//!
//! This module documents the *contract*, not a running scheduler: the
//! scheduler, allocator, and refcounting live in the program the compiler
//! emits, not in the compiler process itself - exactly how the teacher
//! keeps `runtime/embedding/mod.rs` and `runtime/io/io.rs` as host-surface
//! descriptions separate from `compiler_frontend`'s own execution. Trait
//! signatures here are what `emit::state_machine`'s suspended functions
//! and `emit::lowering`'s worker-pool tasks are generated *against* - a
//! future codegen pass that lowers further than wasm bytecode (e.g. to a
//! native target with a real linked runtime) implements these traits
//! rather than redesigning the calling convention.

use std::time::Duration;

/// A value whose escape from its defining scope was not proven during
/// inference (spec.md §4.5: "value types with refcount operations for
/// objects whose escape is not proven"). Escape-proven values are instead
/// passed by the bump arena or register-allocated, never through this
/// trait.
pub trait RefCounted {
    fn retain(&self);
    fn release(&self);
    fn ref_count(&self) -> u32;
}

/// Bump-pointer arena for transient structures, reset between compiler
/// phases (spec.md §3's "Lifecycle": "Tokens and AST live for the
/// duration of one compilation unit and are freed together"). Emitted
/// code gets the same strategy for its own per-call-frame scratch data.
pub trait Arena {
    fn alloc(&mut self, size: usize, align: usize) -> *mut u8;
    fn reset(&mut self);
}

/// A schedulable unit of work; `spawn` hands one to the cooperative
/// scheduler, which runs it to its first suspension point.
pub trait Task: Send {
    type Output: Send;
    fn poll(&mut self, cx: &mut TaskContext) -> Poll<Self::Output>;
}

pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// What a suspended task is waiting on: a timer firing or a file
/// descriptor becoming readable/writable (spec.md §4.5's "an I/O
/// readiness facility (edge-triggered; implementation may be `kqueue`,
/// `epoll`, or IOCP)").
pub enum Awaitable {
    Timer(TimerId),
    FdReadable(RawFd),
    FdWritable(RawFd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

pub type RawFd = i32;

/// Per-task state handed into `Task::poll`: the cancellation flag (spec.md
/// §5: "Cancellation propagates by marking the task's cancel flag; the
/// next suspension raises `Cancelled`") and a handle back to the
/// scheduler for registering a new `Awaitable`.
pub struct TaskContext<'a> {
    pub cancelled: bool,
    pub scheduler: &'a dyn Scheduler,
}

/// The cooperative scheduler surface (spec.md §4.5): `spawn`, `await`,
/// `gather`, `join`. One implementation backs the single-threaded
/// I/O-bound event loop (spec.md §5's "I/O-bound" mode); a second,
/// work-stealing implementation backs the CPU-bound mode. Emitted code
/// never knows which; the compile-time trait analysis (`does_io`) already
/// picked the mode and only ever links against one.
pub trait Scheduler {
    /// Enqueues a task; returns immediately. The task's first poll
    /// happens on the scheduler's own turn, never synchronously inside
    /// `spawn` (spec.md §5: "tasks ready in the same loop turn run in
    /// FIFO order").
    fn spawn(&self, task_id: u64);

    /// Suspends the calling task until `what` is ready.
    fn register_await(&self, task_id: u64, what: Awaitable);

    /// Blocks the calling coroutine until every task in `tasks` has
    /// completed, fanning results back out in the caller's order.
    fn gather(&self, task_ids: &[u64]);

    /// Runs the event loop (or drains the work-stealing pool) until every
    /// spawned task has completed.
    fn join(&self);

    /// Marks `task_id` for cancellation; observed at its next suspension
    /// point, never preemptively.
    fn cancel(&self, task_id: u64);
}

/// Edge-triggered readiness facility (spec.md §4.5, glossary: "the OS
/// mechanism through which the scheduler learns a file descriptor or
/// timer is ready"). One real implementation per target OS backs this
/// (`kqueue` on BSD/macOS, `epoll` on Linux, IOCP on Windows); emitted
/// code never calls the OS primitive directly, only through `Scheduler`.
pub trait ReadinessFacility {
    fn register(&mut self, fd: RawFd, interest: Interest) -> std::io::Result<()>;
    fn deregister(&mut self, fd: RawFd) -> std::io::Result<()>;
    /// Blocks up to `timeout` waiting for at least one registered
    /// interest to fire; returns the fds/timers that became ready.
    fn poll(&mut self, timeout: Option<Duration>) -> std::io::Result<Vec<ReadyEvent>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

#[derive(Debug, Clone, Copy)]
pub enum ReadyEvent {
    Fd(RawFd, Interest),
    Timer(TimerId),
}

/// Work-stealing thread pool backing the CPU-bound scheduling mode
/// (spec.md §4.5: "a thread pool for CPU-bound tasks with work-
/// stealing"; §5: "a task is a value moved across a channel. No shared
/// mutable state between worker threads without explicit synchronization").
pub trait WorkStealingPool {
    fn submit(&self, task_id: u64);
    fn steal(&self, from_worker: usize) -> Option<u64>;
}

/// The only process-wide state an emitted program carries (spec.md §9's
/// "Global state"): the interned small-integer cache (-5..256, spec.md
/// §4.4), the arena, and (at compiler build time, not runtime) the cache
/// directory handle. All three are initialized at program entry and torn
/// down at exit.
pub const SMALL_INT_CACHE_MIN: i64 = -5;
pub const SMALL_INT_CACHE_MAX: i64 = 256;

pub fn is_small_int_cached(value: i64) -> bool {
    (SMALL_INT_CACHE_MIN..=SMALL_INT_CACHE_MAX).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_int_cache_bounds_are_inclusive() {
        assert!(is_small_int_cached(-5));
        assert!(is_small_int_cached(256));
        assert!(!is_small_int_cached(-6));
        assert!(!is_small_int_cached(257));
    }
}
