use std::{path::PathBuf, str::FromStr};

use crate::eid::Eid;

/// Object storage for uploaded media and auxiliary files.
///
/// The daemon serves stored objects back under `/api/file/{ident}`,
/// which is the "public URL" handed out for idea media.
pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn delete(&self, ident: &str) -> std::io::Result<()>;
    fn list(&self) -> Vec<String>;
}

/// Route prefix under which the daemon serves stored objects.
pub const PUBLIC_FILE_PREFIX: &str = "/api/file";

/// Public URL for a stored object ident.
pub fn public_url(ident: &str) -> String {
    format!("{PUBLIC_FILE_PREFIX}/{ident}")
}

#[derive(Clone)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &str) -> std::io::Result<Self> {
        let path =
            PathBuf::from_str(storage_dir).expect("infallible PathBuf::from_str for &str");
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.base_dir.join(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.base_dir.join(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.base_dir.join(ident);
        let temp_path = self.base_dir.join(format!("{}-{ident}", Eid::new()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }

    fn delete(&self, ident: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.base_dir.join(ident))
    }

    fn list(&self) -> Vec<String> {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.is_file() {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path().to_str().unwrap()).unwrap();

        store.write("hello.bin", b"payload").unwrap();
        assert!(store.exists("hello.bin"));
        assert_eq!(store.read("hello.bin").unwrap(), b"payload");

        store.delete("hello.bin").unwrap();
        assert!(!store.exists("hello.bin"));
    }

    #[test]
    fn test_list_only_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path().to_str().unwrap()).unwrap();

        store.write("a", b"1").unwrap();
        store.write("b", b"2").unwrap();
        std::fs::create_dir(tmp.path().join("subdir")).unwrap();

        let mut names = store.list();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("abc123"), "/api/file/abc123");
    }
}
