// Sandboxed filesystem access backing the `file.*`/`dir.*` builtins and the
// `__includes__` loader. Every path is resolved against a single capability
// directory via cap-std, so `..` and absolute paths can never escape the
// configured root regardless of what a document author writes.

use cap_std::fs::Dir;

#[derive(Debug, Clone)]
pub enum SandboxError {
    PathNotAllowed(String),
    NotFound(String),
    TooLarge(String),
    Io(String),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::PathNotAllowed(path) => write!(f, "path not allowed: {path}"),
            SandboxError::NotFound(path) => write!(f, "file not found: {path}"),
            SandboxError::TooLarge(msg) => write!(f, "file too large: {msg}"),
            SandboxError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for SandboxError {}

/// A single capability-rooted directory used for every `file.*`/`dir.*`
/// builtin call and for loading `__includes__` documents.
pub struct Sandbox {
    root: Dir,
    max_file_size: u64,
}

impl Sandbox {
    pub fn new(root: impl AsRef<std::path::Path>, max_file_size: u64) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .map_err(|e| SandboxError::Io(format!("cannot create {}: {e}", root.display())))?;
        let dir = Dir::open_ambient_dir(root, cap_std::ambient_authority())
            .map_err(|e| SandboxError::Io(format!("cannot open {}: {e}", root.display())))?;
        Ok(Self { root: dir, max_file_size })
    }

    fn check_path(path: &str) -> Result<(), SandboxError> {
        if path.starts_with('/') || path.starts_with('\\') || path.contains("..") {
            return Err(SandboxError::PathNotAllowed(path.to_string()));
        }
        Ok(())
    }

    pub fn read_to_string(&self, path: &str) -> Result<String, SandboxError> {
        Self::check_path(path)?;
        self.root.read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::NotFound(path.to_string())
            } else {
                SandboxError::Io(format!("reading {path}: {e}"))
            }
        })
    }

    pub fn write(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        Self::check_path(path)?;
        if contents.len() as u64 > self.max_file_size {
            return Err(SandboxError::TooLarge(format!(
                "{} bytes exceeds limit of {} bytes",
                contents.len(),
                self.max_file_size
            )));
        }
        self.root.write(path, contents).map_err(|e| SandboxError::Io(format!("writing {path}: {e}")))
    }

    pub fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        Self::check_path(path)?;
        match self.root.metadata(path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SandboxError::Io(format!("stat {path}: {e}"))),
        }
    }

    pub fn size(&self, path: &str) -> Result<u64, SandboxError> {
        Self::check_path(path)?;
        self.root.metadata(path).map(|m| m.len()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::NotFound(path.to_string())
            } else {
                SandboxError::Io(format!("stat {path}: {e}"))
            }
        })
    }

    pub fn list(&self, dir: &str) -> Result<Vec<String>, SandboxError> {
        Self::check_path(dir)?;
        self.root
            .read_dir(dir)
            .map_err(|e| SandboxError::Io(format!("listing {dir}: {e}")))?
            .map(|entry| {
                entry
                    .map_err(|e| SandboxError::Io(e.to_string()))
                    .and_then(|e| e.file_name().into_string().map_err(|_| SandboxError::Io("non-utf8 filename".into())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_sandbox() -> (Sandbox, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path(), 1024 * 1024).unwrap();
        (sandbox, dir)
    }

    #[test]
    fn round_trips_file_contents() {
        let (sandbox, _dir) = temp_sandbox();
        sandbox.write("out.txt", "hello").unwrap();
        assert_eq!(sandbox.read_to_string("out.txt").unwrap(), "hello");
        assert!(sandbox.exists("out.txt").unwrap());
        assert_eq!(sandbox.size("out.txt").unwrap(), 5);
    }

    #[test]
    fn rejects_path_traversal() {
        let (sandbox, _dir) = temp_sandbox();
        assert!(matches!(sandbox.read_to_string("../etc/passwd"), Err(SandboxError::PathNotAllowed(_))));
        assert!(matches!(sandbox.read_to_string("/etc/passwd"), Err(SandboxError::PathNotAllowed(_))));
    }

    #[test]
    fn lists_directory_entries() {
        let (sandbox, _dir) = temp_sandbox();
        sandbox.write("a.txt", "1").unwrap();
        sandbox.write("b.txt", "2").unwrap();
        let mut files = sandbox.list(".").unwrap();
        files.sort();
        assert_eq!(files, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path(), 2).unwrap();
        assert!(matches!(sandbox.write("x.txt", "too long"), Err(SandboxError::TooLarge(_))));
    }
}
