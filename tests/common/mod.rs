//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Write an executable stand-in for the encoder binary.
///
/// It copies the first `-i` input to the last argument, and exits 1 with a
/// message on stderr when `-hwaccel` is present. With `fail_always` every
/// invocation exits 1.
#[cfg(unix)]
pub fn fake_encoder(dir: &Path, fail_always: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version fake"
  exit 0
fi
if [ "{fail}" = "1" ]; then
  echo "simulated encoder failure" >&2
  exit 1
fi
input=""
prev=""
last=""
for arg in "$@"; do
  if [ "$arg" = "-hwaccel" ]; then
    echo "hwaccel device not available" >&2
    exit 1
  fi
  if [ "$prev" = "-i" ] && [ -z "$input" ]; then
    input="$arg"
  fi
  prev="$arg"
  last="$arg"
done
cp "$input" "$last"
"#,
        fail = if fail_always { "1" } else { "0" }
    );

    let path = dir.join(if fail_always { "ffmpeg-broken" } else { "ffmpeg-fake" });
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Write an encoder stand-in that sleeps, then touches `marker`.
///
/// A killed run never creates the marker.
#[cfg(unix)]
pub fn slow_encoder(dir: &Path, marker: &Path, sleep_secs: u32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\nsleep {}\ntouch '{}'\nexit 1\n",
        sleep_secs,
        marker.display()
    );
    let path = dir.join("ffmpeg-slow");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Number of entries directly under `dir`
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
