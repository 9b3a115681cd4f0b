//! Kernel-wide size limits shared between the VM and filesystem subsystems.

/// Size of a physical/virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Maximum length of a single path component, not counting the NUL byte.
pub const NAME_MAX: usize = 59;

/// Maximum length of a full path.
pub const PATH_MAX: usize = 4096;

/// Maximum size of a symbolic link target (unused: symlinks are a non-goal, kept for parity
/// with the teacher's limits module so call sites that mention "no symlinks" read naturally).
pub const SYMLINK_MAX: usize = PAGE_SIZE;

/// Maximum number of file descriptors a single process may have open at once.
pub const OPEN_MAX: u32 = 1024;
