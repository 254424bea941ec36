//! Reading local documents as source text.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Largest file accepted as a source, in bytes.
pub const MAX_SOURCE_FILE_BYTES: u64 = 20 * 1024 * 1024;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "adoc", "org", "tex", "html", "htm", "xml", "json", "yaml",
    "yml", "toml", "csv", "tsv", "srt", "vtt", "log",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "mp3", "mp4", "wav", "flac", "m4a", "ogg",
    "mov", "mkv", "zip", "gz", "tar", "7z", "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx",
    "exe", "dll", "so", "dylib", "bin", "db", "sqlite",
];

/// Whether `path` looks like a UTF-8 text document.
///
/// Known extensions decide directly; otherwise the first 512 bytes are
/// checked for NUL bytes.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return true;
        }
    }

    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut buffer = [0u8; 512];
    match file.read(&mut buffer) {
        Ok(n) => !buffer[..n].contains(&0),
        Err(_) => false,
    }
}

/// Read a text file, rejecting anything over `max_bytes`.
pub fn read_file_content(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let len = fs::metadata(path)?.len();
    if len > max_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file exceeds maximum size: {} > {}", len, max_bytes),
        ));
    }
    fs::read_to_string(path)
}

/// Expand `path` into the text files it names: the file itself, or every
/// text file below a directory (hidden entries skipped), sorted.
pub fn collect_text_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_text_file(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_text_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Title for a file source: the file stem, or the whole name as a fallback.
pub fn file_title(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_text_file_by_extension() {
        assert!(is_text_file(Path::new("notes.md")));
        assert!(is_text_file(Path::new("talk.srt")));
        assert!(!is_text_file(Path::new("talk.mp3")));
        assert!(!is_text_file(Path::new("paper.pdf")));
    }

    #[test]
    fn test_collect_text_files_skips_hidden_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "# b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("img.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), "ref").unwrap();

        let files = collect_text_files(dir.path());
        let names: Vec<String> = files.iter().map(|p| file_title(p)).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_read_file_content_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "0123456789").unwrap();

        assert!(read_file_content(&path, 5).is_err());
        assert_eq!(read_file_content(&path, 10).unwrap(), "0123456789");
    }
}
