//! Directory-structured test set discovery.
//!
//! Every immediate sub-directory of the root is a class, symlinked ones
//! included. Images are collected from anywhere below a class directory.
//! Class names are sorted once here and that order defines the label indices
//! for the whole run.

use robustcam_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// File extensions treated as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// A labeled image folder: sorted class names plus `(path, label)` samples
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<(PathBuf, usize)>,
}

impl ImageFolder {
    /// Scans `root` for class directories and their image files
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            return Err(Error::Dataset(format!(
                "Directory not found: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(Error::Dataset(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.path().is_dir() {
                classes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(Error::Dataset(format!(
                "No class directories found in {}",
                root.display()
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let images = scan_images(&root.join(class_name))?;
            if images.is_empty() {
                return Err(Error::Dataset(format!(
                    "Class directory '{}' contains no images (supported: {})",
                    class_name,
                    IMAGE_EXTENSIONS.join(", ")
                )));
            }
            debug!("Class {} '{}': {} images", label, class_name, images.len());
            samples.extend(images.into_iter().map(|path| (path, label)));
        }

        Ok(Self {
            root,
            classes,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted class names, index-aligned with labels
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// `(path, label)` pairs in class order, then directory and file-name order
    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples per class
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }
}

/// Returns `true` when the path has one of [`IMAGE_EXTENSIONS`]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Image files anywhere below `dir`, following symlinks
///
/// Files are grouped by parent directory (sorted by path), then sorted by
/// name within each directory.
fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            Error::Dataset(format!("Failed to walk {}: {}", dir.display(), e))
        })?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }

    images.sort_by(|a, b| {
        let parent = |p: &PathBuf| p.parent().map(|d| d.as_os_str().to_owned());
        parent(a)
            .cmp(&parent(b))
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(path: &Path) {
        let img = image::ImageBuffer::from_fn(10, 10, |_, _| image::Rgb([255u8, 0u8, 0u8]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let result = ImageFolder::open("/nonexistent/test/set");
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = ImageFolder::open(temp_dir.path());
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_class_without_images() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("cats")).unwrap();
        fs::write(temp_dir.path().join("cats/readme.txt"), "text").unwrap();

        let result = ImageFolder::open(temp_dir.path());
        assert!(matches!(result, Err(Error::Dataset(_))));
    }

    #[test]
    fn test_classes_sorted_and_labels_aligned() {
        let temp_dir = TempDir::new().unwrap();
        for class in ["zebra", "ant", "moth"] {
            fs::create_dir(temp_dir.path().join(class)).unwrap();
            create_test_image(&temp_dir.path().join(class).join("b.png"));
            create_test_image(&temp_dir.path().join(class).join("a.PNG"));
        }
        fs::write(temp_dir.path().join("stray.png"), "not a class").unwrap();

        let folder = ImageFolder::open(temp_dir.path()).unwrap();

        assert_eq!(folder.classes(), &["ant", "moth", "zebra"]);
        assert_eq!(folder.len(), 6);
        assert_eq!(folder.class_distribution(), vec![2, 2, 2]);

        let (first_path, first_label) = &folder.samples()[0];
        assert_eq!(*first_label, 0);
        assert!(first_path.ends_with("ant/a.PNG"));
        assert_eq!(folder.samples()[5].1, 2);
    }

    #[test]
    fn test_nested_class_images_are_collected() {
        let temp_dir = TempDir::new().unwrap();
        let cats = temp_dir.path().join("cats");
        fs::create_dir_all(cats.join("batch1")).unwrap();
        fs::create_dir_all(cats.join("batch2/deep")).unwrap();
        create_test_image(&cats.join("batch1/a.png"));
        create_test_image(&cats.join("batch2/deep/c.png"));
        create_test_image(&cats.join("batch2/b.png"));
        create_test_image(&cats.join("z.png"));

        let folder = ImageFolder::open(temp_dir.path()).unwrap();

        let paths: Vec<PathBuf> = folder
            .samples()
            .iter()
            .map(|(path, _)| path.strip_prefix(&cats).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("z.png"),
                PathBuf::from("batch1/a.png"),
                PathBuf::from("batch2/b.png"),
                PathBuf::from("batch2/deep/c.png"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_class_directory() {
        let temp_dir = TempDir::new().unwrap();
        let storage = TempDir::new().unwrap();
        create_test_image(&storage.path().join("a.png"));
        fs::create_dir(temp_dir.path().join("birds")).unwrap();
        create_test_image(&temp_dir.path().join("birds/b.png"));
        std::os::unix::fs::symlink(storage.path(), temp_dir.path().join("cats")).unwrap();

        let folder = ImageFolder::open(temp_dir.path()).unwrap();

        assert_eq!(folder.classes(), &["birds", "cats"]);
        assert_eq!(folder.class_distribution(), vec![1, 1]);
        assert!(folder.samples()[1].0.ends_with("cats/a.png"));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("scan.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }
}
