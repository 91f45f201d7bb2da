//! Discovery of images to classify.

use std::path::{Path, PathBuf};

/// Extensions accepted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// One image to classify and relocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    /// Full path of the source file.
    pub path: PathBuf,
    /// File name shown in logs.
    pub name: String,
}

impl ImageTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }
}

/// Returns true if the path has one of [`IMAGE_EXTENSIONS`].
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Lists images directly inside `input_dir` (not recursive), sorted by name.
pub fn discover(input_dir: &Path) -> std::io::Result<Vec<ImageTask>> {
    let mut tasks = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image(&path) {
            tasks.push(ImageTask::new(path));
        }
    }
    tasks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn image_extensions_are_case_insensitive() {
        assert!(is_image(Path::new("a.JPG")));
        assert!(is_image(Path::new("a.Jpeg")));
        assert!(is_image(Path::new("dir/a.webp")));
        assert!(!is_image(Path::new("a.tiff")));
        assert!(!is_image(Path::new("a.jpg.txt")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn discover_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.gif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.jpg"), b"x").unwrap();

        let names: Vec<String> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.gif"]);
    }

    #[test]
    fn discover_missing_dir_errors() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn task_name_is_file_name() {
        let task = ImageTask::new("/in/photo.png");
        assert_eq!(task.name, "photo.png");
    }
}
