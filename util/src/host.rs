//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Get the root directory of the software install.
///
/// This is read from the `STRIDER_SW_ROOT` environment variable, which must
/// point at the directory containing `params` and `sessions`.
pub fn get_strider_sw_root() -> Result<PathBuf, env::VarError> {
    env::var("STRIDER_SW_ROOT").map(PathBuf::from)
}

/// Retrieve the hostname of the machine running the software.
///
/// Falls back to "unknown" if the kernel doesn't expose one.
pub fn get_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| String::from("unknown"))
}
