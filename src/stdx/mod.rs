//! Small, self-contained data structures used across the project.

pub mod chunked_deque;
pub mod spin_lock;

pub use chunked_deque::{ChunkAllocError, ChunkedDeque};
pub use spin_lock::{SpinGuard, SpinLock};
