//! Stub renderer scripts.
//!
//! Each stub is a `/bin/sh` script taking `source destination z x y`, so
//! tests can exercise the real subprocess path without GDAL or Python.
//! Stubs are run as `/bin/sh <script> ...` rather than executed directly,
//! which avoids `ETXTBSY` when another test thread forks while a script
//! is still being written.

use std::fs;
use std::path::{Path, PathBuf};

/// Bytes the succeeding stubs write as the "rendered" tile.
pub const STUB_TILE_BYTES: &[u8] = b"\x89PNG-stub-tile";

/// What a stub renderer does when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Write the tile and exit 0
    Succeed,
    /// Sleep for the given milliseconds, then write the tile and exit 0
    SucceedAfterMs(u64),
    /// Print an error and exit with the given status, writing nothing
    Fail(i32),
    /// Exit 0 without writing a tile
    SucceedWithoutTile,
    /// Sleep far longer than any test timeout
    Hang,
    /// Write a truncated tile, then exit with the given status
    PartialThenFail(i32),
    /// Write a truncated tile, then sleep far longer than any test timeout
    PartialThenHang,
}

/// Write an executable stub renderer into `dir` and return its path.
///
/// Every invocation appends its arguments to `<script>.log`, one line per
/// run, so tests can count and inspect renderer calls.
#[cfg(unix)]
pub fn stub_renderer(dir: &Path, behavior: StubBehavior) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let name = match behavior {
        StubBehavior::Succeed => "render-ok.sh".to_string(),
        StubBehavior::SucceedAfterMs(ms) => format!("render-slow-{}.sh", ms),
        StubBehavior::Fail(code) => format!("render-fail-{}.sh", code),
        StubBehavior::SucceedWithoutTile => "render-no-tile.sh".to_string(),
        StubBehavior::Hang => "render-hang.sh".to_string(),
        StubBehavior::PartialThenFail(code) => format!("render-partial-fail-{}.sh", code),
        StubBehavior::PartialThenHang => "render-partial-hang.sh".to_string(),
    };
    let path = dir.join(name);
    let log = invocation_log(&path);

    let body = match behavior {
        StubBehavior::Succeed => write_tile_body(),
        StubBehavior::SucceedAfterMs(ms) => {
            format!("sleep {}.{:03}\n{}", ms / 1000, ms % 1000, write_tile_body())
        }
        StubBehavior::Fail(code) => format!(
            "echo \"cannot open $1\" >&2\nexit {}\n",
            code
        ),
        StubBehavior::SucceedWithoutTile => "echo \"nothing to do\"\nexit 0\n".to_string(),
        StubBehavior::Hang => "sleep 30\n".to_string(),
        StubBehavior::PartialThenFail(code) => {
            format!("{}echo \"write failed\" >&2\nexit {}\n", PARTIAL_WRITE, code)
        }
        StubBehavior::PartialThenHang => format!("{}sleep 30\n", PARTIAL_WRITE),
    };

    let script = format!(
        "#!/bin/sh\necho \"$@\" >> '{}'\n{}",
        log.display(),
        body
    );
    fs::write(&path, script).expect("failed to write stub renderer");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("failed to make stub renderer executable");
    path
}

const PARTIAL_WRITE: &str = "printf 'PARTIAL' > \"$2\"\n";

fn write_tile_body() -> String {
    let escaped: String = STUB_TILE_BYTES
        .iter()
        .map(|b| format!("\\{:03o}", b))
        .collect();
    format!(
        "echo \"rendering $3/$4/$5 from $1\"\nprintf '{}' > \"$2\"\nexit 0\n",
        escaped
    )
}

/// Path of the invocation log kept next to a stub script.
pub fn invocation_log(script: &Path) -> PathBuf {
    let mut name = script.as_os_str().to_owned();
    name.push(".log");
    PathBuf::from(name)
}

/// Argument lines recorded by a stub, one per invocation.
pub fn recorded_invocations(script: &Path) -> Vec<String> {
    fs::read_to_string(invocation_log(script))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
