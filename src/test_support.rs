//! Fake `ffmpeg` executables for exercising the runner without a real muxer.
//!
//! Each script answers `-version`, echoes an `Opening '<path>'` line for the
//! concat list itself and for every entry in it, then runs its own tail.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::TempDir;

pub struct FakeMuxers {
    _dir: TempDir,
    /// Copies the concat list to the output path and exits 0.
    pub ok: PathBuf,
    pub fail: PathBuf,
    pub hang: PathBuf,
    /// Deletes the concat list out from under the runner, then succeeds.
    pub vanish: PathBuf,
}

fn script(tail: &str) -> String {
    format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 0.0-fake"
  exit 0
fi
list=""
prev=""
out=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then list="$arg"; fi
  prev="$arg"
  out="$arg"
done
echo "[concat @ 0x0] [debug] Opening '$list' for reading" >&2
sed -n "s/^file '\(.*\)'\$/\1/p" "$list" | while IFS= read -r p; do
  echo "[AVFormatContext @ 0x0] [debug] Opening '$p' for reading" >&2
done
{tail}
"#
    )
}

// Written once per test binary so no test forks while a script is still open for writing.
pub fn fake_muxer_scripts() -> &'static FakeMuxers {
    static SCRIPTS: OnceLock<FakeMuxers> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = TempDir::new().expect("script dir");
        let write = |name: &str, tail: &str| {
            let path = dir.path().join(name);
            fs::write(&path, script(tail)).expect("write script");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
            path
        };
        let ok = write(
            "fake-ok",
            "echo \"[mp4 @ 0x0] [warning] timestamps are unset\" >&2\ncp \"$list\" \"$out\"\nexit 0",
        );
        let fail = write(
            "fake-fail",
            "echo \"[out @ 0x0] [error] Error opening output file $out\" >&2\nexit 1",
        );
        let hang = write("fake-hang", "exec sleep 30");
        let vanish = write("fake-vanish", "rm -f \"$list\"\nexit 0");
        FakeMuxers {
            _dir: dir,
            ok,
            fail,
            hang,
            vanish,
        }
    })
}
