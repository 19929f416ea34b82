//! Attachment persistence for chat turns.
//!
//! Uploaded files land in the per-chat uploads directory; name collisions
//! get a `_<unix-ms>` suffix. Each stored file contributes one annotation
//! line appended to the prompt; images are additionally handed to the agent
//! as image inputs.

use std::path::{Path, PathBuf};

use tracing::{error, info};

/// One uploaded file, already read into memory by the HTTP layer (or
/// fetched by a social driver).
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProcessedAttachments {
    /// Annotation lines to append to the prompt.
    pub annotation: String,
    /// Host paths of stored images, passed to the agent as image inputs.
    pub image_paths: Vec<String>,
}

/// Store attachments under `uploads_dir` and build their prompt annotation.
///
/// A file that fails to store contributes an error annotation instead of
/// failing the turn.
pub fn store_attachments(uploads_dir: &Path, files: &[IncomingFile]) -> ProcessedAttachments {
    let mut out = ProcessedAttachments::default();
    if files.is_empty() {
        return out;
    }

    if let Err(e) = std::fs::create_dir_all(uploads_dir) {
        error!(error = %e, "failed to create uploads directory");
        out.annotation
            .push_str("\n[System Error: Failed to process attachments]");
        return out;
    }

    for file in files {
        let safe_name = sanitize_filename(&file.filename);
        let target = resolve_target_path(uploads_dir, &safe_name);

        if let Err(e) = std::fs::write(&target, &file.content) {
            error!(filename = %file.filename, error = %e, "failed to store attachment");
            out.annotation
                .push_str(&format!("\n[Failed to store attached file: {safe_name}]"));
            continue;
        }

        let stored_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(safe_name.clone());
        let virtual_path = format!("/persistence/uploads/{stored_name}");
        info!(path = %virtual_path, "attachment stored");

        if is_image(file) {
            out.image_paths.push(target.to_string_lossy().to_string());
            out.annotation
                .push_str(&format!("\n[User attached an image: {virtual_path}]"));
        } else {
            out.annotation
                .push_str(&format!("\n[User attached a file: {virtual_path}]"));
        }
    }
    out
}

/// Append a millisecond timestamp suffix when the target already exists.
fn resolve_target_path(dir: &Path, filename: &str) -> PathBuf {
    let target = dir.join(filename);
    if !target.exists() {
        return target;
    }
    let millis = chrono::Utc::now().timestamp_millis();
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (filename, String::new()),
    };
    dir.join(format!("{stem}_{millis}{ext}"))
}

fn sanitize_filename(name: &str) -> String {
    // Only the final path component counts; directory parts are untrusted.
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn is_image(file: &IncomingFile) -> bool {
    if let Some(ref ct) = file.content_type {
        if ct.starts_with("image/") {
            return true;
        }
    }
    let lower = file.filename.to_lowercase();
    ["png", "jpg", "jpeg", "gif", "webp", "bmp"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: Option<&str>) -> IncomingFile {
        IncomingFile {
            filename: name.to_string(),
            content: b"data".to_vec(),
            content_type: content_type.map(String::from),
        }
    }

    #[test]
    fn image_annotation_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = store_attachments(dir.path(), &[file("photo.png", Some("image/png"))]);

        assert!(out
            .annotation
            .contains("[User attached an image: /persistence/uploads/photo.png]"));
        assert_eq!(out.image_paths.len(), 1);
        assert!(dir.path().join("photo.png").exists());
    }

    #[test]
    fn non_image_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let out = store_attachments(dir.path(), &[file("notes.txt", Some("text/plain"))]);
        assert!(out
            .annotation
            .contains("[User attached a file: /persistence/uploads/notes.txt]"));
        assert!(out.image_paths.is_empty());
    }

    #[test]
    fn collision_gets_timestamp_suffix() {
        let dir = tempfile::tempdir().unwrap();
        store_attachments(dir.path(), &[file("a.txt", None)]);
        store_attachments(dir.path(), &[file("a.txt", None)]);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n == "a.txt"));
        assert!(names
            .iter()
            .any(|n| n.starts_with("a_") && n.ends_with(".txt")));
    }

    #[test]
    fn hostile_filenames_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let out = store_attachments(dir.path(), &[file("../../etc/passwd", None)]);
        assert!(!out.annotation.contains(".."));
        // Everything stays inside the uploads dir.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn extension_detects_images_without_content_type() {
        assert!(is_image(&file("x.JPG", None)));
        assert!(!is_image(&file("x.pdf", None)));
    }
}
