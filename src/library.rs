//! Where audio files live on disk.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::file_timestamp;

pub const DEFAULT_EXTENSION: &str = "wav";

#[derive(Debug, Clone, PartialEq)]
pub struct AudioLibrary {
    /// Bare playback and transcription names resolve here.
    pub recordings_dir: PathBuf,
    /// Generated capture files land here.
    pub capture_dir: PathBuf,
    /// Synthesized speech is saved here.
    pub output_dir: PathBuf,
    /// Container extension given to bare names, without the dot.
    pub extension: String,
}

impl Default for AudioLibrary {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("./recordings"),
            capture_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("./audio-output"),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl AudioLibrary {
    /// Same directory for everything, handy for scratch setups.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            recordings_dir: dir.clone(),
            capture_dir: dir.clone(),
            output_dir: dir,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Turn a user-supplied name into an absolute path.
    ///
    /// A name without separators is looked up in the recordings directory
    /// and gets the default extension if it has none. Anything else is taken
    /// as a path.
    pub fn resolve(&self, name: &str) -> PathBuf {
        let is_bare = !name.contains('/') && !name.contains('\\') && !Path::new(name).is_absolute();

        let path = if is_bare {
            let mut file = name.to_string();
            if Path::new(name).extension().is_none() {
                file.push('.');
                file.push_str(&self.extension);
            }
            self.recordings_dir.join(file)
        } else {
            PathBuf::from(name)
        };

        std::path::absolute(&path).unwrap_or(path)
    }

    /// A capture path that does not exist yet:
    /// `recording-<timestamp>.<ext>`, then `-1`, `-2`, ... on collision.
    pub fn unique_capture_path(&self, extension: &str) -> PathBuf {
        let stem = format!("recording-{}", file_timestamp());
        let mut candidate = self.capture_dir.join(format!("{}.{}", stem, extension));
        let mut n = 1u32;
        while candidate.exists() {
            candidate = self
                .capture_dir
                .join(format!("{}-{}.{}", stem, n, extension));
            n += 1;
        }
        candidate
    }

    /// Files in the recordings directory with `extension`, sorted by name.
    pub fn list(&self, extension: &str) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.recordings_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let extension = extension.trim_start_matches('.');
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if matches {
                if let Some(name) = path.file_name() {
                    names.push(name.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_resolves_under_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let library = AudioLibrary::in_dir(dir.path());

        assert_eq!(library.resolve("demo"), dir.path().join("demo.wav"));
        assert_eq!(library.resolve("demo.mp3"), dir.path().join("demo.mp3"));
    }

    #[test]
    fn test_paths_are_taken_as_given() {
        let library = AudioLibrary::in_dir("/srv/audio");

        assert_eq!(library.resolve("/tmp/a.wav"), PathBuf::from("/tmp/a.wav"));
        assert_eq!(library.resolve("/tmp/noext"), PathBuf::from("/tmp/noext"));

        let relative = library.resolve("sub/take");
        assert!(relative.is_absolute());
        assert!(relative.ends_with("sub/take"));
    }

    #[test]
    fn test_capture_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let library = AudioLibrary::in_dir(dir.path());

        let first = library.unique_capture_path("wav");
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".wav"));
        assert!(!name.contains(':'));

        std::fs::write(&first, b"taken").unwrap();
        let second = library.unique_capture_path("wav");
        assert_ne!(first, second);
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let library = AudioLibrary::in_dir(dir.path());
        for name in ["b.wav", "a.WAV", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.wav")).unwrap();

        assert_eq!(library.list("wav").unwrap(), vec!["a.WAV", "b.wav"]);
        assert_eq!(library.list(".txt").unwrap(), vec!["notes.txt"]);

        let missing = AudioLibrary::in_dir(dir.path().join("missing"));
        assert!(missing.list("wav").unwrap().is_empty());
    }
}
