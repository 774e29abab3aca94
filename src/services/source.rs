use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input {path} does not exist")]
    NotFound { path: PathBuf },

    #[error("{path} is not a valid ZIP archive: {source}")]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("{path} contains no files at its top level")]
    Empty { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A file taken from the batch input, identified by its name at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
}

/// Files of one batch. Extracted archive content lives in a temporary
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct BatchSource {
    pub files: Vec<SourceFile>,
    workdir: Option<TempDir>,
}

impl BatchSource {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }
}

pub struct SourceService;

impl SourceService {
    pub fn new() -> Self {
        Self
    }

    /// Open a ZIP archive or a directory. Only top-level files are used.
    pub fn open(&self, input: &Path) -> Result<BatchSource, SourceError> {
        if !input.exists() {
            return Err(SourceError::NotFound {
                path: input.to_path_buf(),
            });
        }

        if input.is_dir() {
            self.open_directory(input)
        } else {
            self.extract_archive(input)
        }
    }

    pub fn extract_archive(&self, archive_path: &Path) -> Result<BatchSource, SourceError> {
        let file = File::open(archive_path)?;
        let mut archive =
            ZipArchive::new(file).map_err(|source| SourceError::InvalidArchive {
                path: archive_path.to_path_buf(),
                source,
            })?;

        let workdir = tempfile::Builder::new().prefix("fimint-").tempdir()?;
        let mut files = Vec::new();

        for index in 0..archive.len() {
            let mut entry =
                archive
                    .by_index(index)
                    .map_err(|source| SourceError::InvalidArchive {
                        path: archive_path.to_path_buf(),
                        source,
                    })?;
            if entry.is_dir() {
                continue;
            }

            let Some(name) = root_file_name(entry.enclosed_name().as_deref()) else {
                log::debug!("Skipping nested or unsafe archive entry {}", entry.name());
                continue;
            };

            let target = workdir.path().join(&name);
            if target.exists() {
                log::warn!("Archive contains {} more than once; keeping the first", name);
                continue;
            }

            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            files.push(SourceFile { name, path: target });
        }

        if files.is_empty() {
            return Err(SourceError::Empty {
                path: archive_path.to_path_buf(),
            });
        }

        log::info!(
            "Extracted {} files from {} into {}",
            files.len(),
            archive_path.display(),
            workdir.path().display()
        );

        Ok(BatchSource {
            files,
            workdir: Some(workdir),
        })
    }

    pub fn open_directory(&self, dir: &Path) -> Result<BatchSource, SourceError> {
        let mut files: Vec<SourceFile> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| SourceFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.into_path(),
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        if files.is_empty() {
            return Err(SourceError::Empty {
                path: dir.to_path_buf(),
            });
        }

        Ok(BatchSource {
            files,
            workdir: None,
        })
    }
}

impl Default for SourceService {
    fn default() -> Self {
        Self::new()
    }
}

/// The file name of an entry stored at the archive root, `None` for
/// entries inside subdirectories.
fn root_file_name(path: Option<&Path>) -> Option<String> {
    let path = path?;
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extracts_root_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("batch.zip");
        write_zip(
            &archive,
            &[
                ("a.txt", "alpha"),
                ("nested/", ""),
                ("nested/b.txt", "beta"),
                ("c.txt", "gamma"),
            ],
        );

        let source = SourceService::new().open(&archive).unwrap();
        let names: Vec<_> = source.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
        assert_eq!(fs::read(&source.files[0].path).unwrap(), b"alpha");
    }

    #[test]
    fn test_workdir_is_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("batch.zip");
        write_zip(&archive, &[("a.txt", "alpha")]);

        let source = SourceService::new().open(&archive).unwrap();
        let workdir = source.workdir().unwrap().to_path_buf();
        assert!(workdir.exists());
        drop(source);
        assert!(!workdir.exists());
    }

    #[test]
    fn test_invalid_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("not-a.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = SourceService::new().open(&archive).unwrap_err();
        assert!(matches!(err, SourceError::InvalidArchive { .. }));
    }

    #[test]
    fn test_archive_without_root_files() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("empty.zip");
        write_zip(&archive, &[("dir/", ""), ("dir/x.txt", "x")]);

        let err = SourceService::new().open(&archive).unwrap_err();
        assert!(matches!(err, SourceError::Empty { .. }));
    }

    #[test]
    fn test_directory_input() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("sub").join("c.txt"), b"c").unwrap();

        let source = SourceService::new().open(temp_dir.path()).unwrap();
        let names: Vec<_> = source.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(source.workdir().is_none());
    }

    #[test]
    fn test_missing_input() {
        let err = SourceService::new()
            .open(Path::new("/non/existent/batch.zip"))
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }
}
