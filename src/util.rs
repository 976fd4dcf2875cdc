//! Miscellaneous utilities.

use std::{
    fs,
    io::{self, Write},
};

use camino::Utf8Path;

/// Atomically write a file.
///
/// Fails with [`io::ErrorKind::InvalidInput`] if `path` does not name a file.
pub fn write_file(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let (Some(dir), Some(_)) = (path.parent(), path.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{path}' is not a file path"),
        ));
    };
    // A bare file name refers to the current directory.
    let dir = if dir.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        dir
    };
    fs::create_dir_all(dir)?;

    // Obtain a temporary file in the same directory.
    let mut tmp_file = tempfile::Builder::new().tempfile_in(dir)?;

    // Fill up the temporary file.
    tmp_file.as_file_mut().write_all(contents)?;

    // Replace the target path with the temporary file.
    let _ = tmp_file.persist(path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn replaces_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let path = dir.join("nested/export.json");

        write_file(&path, b"[]").unwrap();
        write_file(&path, b"[{}]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{}]");

        // Only the target remains; the temporary file was renamed into place.
        assert_eq!(fs::read_dir(dir.join("nested")).unwrap().count(), 1);
    }

    #[test]
    fn rejects_non_file_paths() {
        for path in ["/", ""] {
            let err = write_file(Utf8Path::new(path), b"[]").unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{path:?}");
        }
    }
}
