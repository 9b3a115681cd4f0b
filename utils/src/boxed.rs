//! Re-export of the allocator-backed box type used throughout the kernel.

pub use alloc::boxed::Box;
