//! Shared test utilities for tether integration tests.
//!
//! Fake harnesses are plain `#!/bin/sh` scripts written into a tempdir
//! and marked executable; tests point the supervisor at them instead of a
//! real agent binary. Helpers here cover the behaviors the reliability
//! layer must survive: clean streaming, going silent mid-run, sleeping
//! forever, ignoring the polite termination signal, and leaving
//! grandchildren behind.

use std::path::{Path, PathBuf};

/// Create a tempdir to hold fake harness scripts for one test.
pub fn script_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create script tempdir")
}

/// Write an executable `/bin/sh` script and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write fake harness");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to mark fake harness executable");
    }

    path
}

/// A harness that emits `count` lines, one every `interval_ms`, then
/// exits cleanly.
pub fn chatty_harness(dir: &Path, count: u32, interval_ms: u64) -> PathBuf {
    let interval = interval_ms as f64 / 1000.0;
    write_script(
        dir,
        "chatty.sh",
        &format!(
            "i=0\n\
             while [ $i -lt {count} ]; do\n\
             \techo line-$i\n\
             \ti=$((i+1))\n\
             \tsleep {interval}\n\
             done"
        ),
    )
}

/// A harness that shows one sign of life and then hangs forever: the
/// shape an activity watchdog exists to catch.
pub fn stalling_harness(dir: &Path) -> PathBuf {
    write_script(dir, "stalling.sh", "echo ready\nsleep 600")
}

/// A harness that produces nothing and sleeps for `secs`.
pub fn sleepy_harness(dir: &Path, secs: u32) -> PathBuf {
    write_script(dir, "sleepy.sh", &format!("sleep {secs}"))
}

/// A harness that traps the polite termination signal and keeps running,
/// forcing the kill escalation. Prints its own pid first so tests can
/// check it is really gone afterwards.
pub fn stubborn_harness(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "stubborn.sh",
        "trap '' TERM\necho pid=$$\nwhile :; do sleep 1; done",
    )
}

/// A harness that spawns a long-lived grandchild, prints the grandchild's
/// pid, and then sleeps. Lets tests verify that termination reaches the
/// whole process group, not just the direct child.
pub fn forking_harness(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "forking.sh",
        "sleep 600 &\necho grandchild=$!\nsleep 600",
    )
}
