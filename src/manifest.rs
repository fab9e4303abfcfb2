//! Transient concat list consumed by the muxer's `concat` demuxer.
//!
//! One `file '<path>'` line per segment, in concatenation order. The file
//! lives in a `tempfile` so every early return or panic still removes it;
//! the normal path removes it explicitly through [`ConcatManifest::cleanup`]
//! so a failed delete can be reported.

use crate::error::{RunWarning, StitchError};
use crate::scanner::{unusable_path_reason, Segment};

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct ConcatManifest {
    file: NamedTempFile,
    entries: usize,
}

impl ConcatManifest {
    pub fn write(segments: &[Segment], dir: &Path) -> Result<Self, StitchError> {
        let write_err = |source| StitchError::ManifestWrite {
            dir: dir.to_path_buf(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix("concat_list_")
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(write_err)?;

        {
            let mut wtr = BufWriter::new(file.as_file_mut());
            for seg in segments {
                let line = manifest_line(&seg.path).map_err(write_err)?;
                writeln!(wtr, "{}", line).map_err(write_err)?;
            }
            wtr.flush().map_err(write_err)?;
        }
        file.as_file().sync_all().map_err(write_err)?;

        Ok(Self {
            file,
            entries: segments.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn cleanup(self) -> Result<(), RunWarning> {
        let path: PathBuf = self.file.path().to_path_buf();
        self.file.close().map_err(|e| RunWarning::ManifestCleanup {
            path,
            reason: e.to_string(),
        })
    }
}

/// Forward slashes only; a `'` closes the quoted token, so it is written as `'\''`.
/// Paths that would not survive as one token are refused rather than mangled.
pub fn manifest_line(path: &Path) -> io::Result<String> {
    if let Some(reason) = unusable_path_reason(path) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), reason),
        ));
    }
    let normalized = path.to_string_lossy().replace('\\', "/");
    Ok(format!("file '{}'", normalized.replace('\'', r"'\''")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Provenance;
    use std::fs;
    use tempfile::TempDir;

    fn seg(path: &str) -> Segment {
        Segment::new(PathBuf::from(path), Provenance::Driving, Some(1))
    }

    #[test]
    fn lines_follow_segment_order_exactly() {
        let tmp = TempDir::new().expect("tempdir");
        let segments = vec![seg("/cam/b.mp4"), seg("/cam/Parking/a.mp4"), seg("/cam/c.MOV")];

        let manifest = ConcatManifest::write(&segments, tmp.path()).expect("write manifest");
        assert_eq!(manifest.len(), 3);
        let text = fs::read_to_string(manifest.path()).expect("read manifest");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/cam/b.mp4'",
                "file '/cam/Parking/a.mp4'",
                "file '/cam/c.MOV'",
            ]
        );
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        assert_eq!(
            manifest_line(Path::new("/trips/bob's car/a.mp4")).expect("line"),
            r"file '/trips/bob'\''s car/a.mp4'"
        );
        assert_eq!(
            manifest_line(Path::new(r"C:\DCIM\Movie\a.mp4")).expect("line"),
            "file 'C:/DCIM/Movie/a.mp4'"
        );
    }

    #[test]
    fn line_break_in_a_path_is_refused_not_split() {
        let tmp = TempDir::new().expect("tempdir");
        let segments = vec![seg("/cam/a\nb.mp4"), seg("/cam/c.mp4")];

        let err = ConcatManifest::write(&segments, tmp.path()).unwrap_err();
        assert!(matches!(
            &err,
            StitchError::ManifestWrite { source, .. } if source.kind() == io::ErrorKind::InvalidData
        ));
        assert!(err.to_string().contains("line break"));
        // The half-written list is not left behind.
        assert_eq!(fs::read_dir(tmp.path()).expect("read dir").count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_is_refused_not_replaced() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/cam/clip\xff.mp4"));
        let err = manifest_line(path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn cleanup_removes_the_file() {
        let tmp = TempDir::new().expect("tempdir");
        let manifest = ConcatManifest::write(&[seg("/cam/a.mp4")], tmp.path()).expect("write");
        let path = manifest.path().to_path_buf();
        assert!(path.exists());
        manifest.cleanup().expect("cleanup");
        assert!(!path.exists());
        assert_eq!(fs::read_dir(tmp.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn unwritable_directory_is_a_manifest_write_error() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("missing");
        let err = ConcatManifest::write(&[seg("/cam/a.mp4")], &missing).unwrap_err();
        assert!(matches!(err, StitchError::ManifestWrite { dir, .. } if dir == missing));
    }
}
