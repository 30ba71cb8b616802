//! Kernel: dependency container, job scheduling infrastructure, built-in
//! tasks.

pub mod jobs;
pub mod server_kernel;
pub mod tasks;

pub use server_kernel::ServerKernel;
pub use tasks::{ensure_default_jobs, register_builtin_jobs};
