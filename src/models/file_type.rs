//! File-extension classification tables.
//!
//! Extensions are handled in their `.ext` form, lower-cased, the same way
//! they are stored in `DocumentMetadata::file_type`.

use std::path::Path;

/// Lower-cased extension of `file_name` including the leading dot, or an
/// empty string when there is none.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// File name without its extension.
pub fn stem_of(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
        .to_string()
}

/// Folder used in the remote store layout for a given extension.
pub fn type_folder(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        ".docx" | ".doc" => "word",
        ".xlsx" | ".xls" => "excel",
        ".pptx" | ".ppt" => "powerpoint",
        ".pdf" => "pdf",
        ".md" => "markdown",
        ".txt" => "text",
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" => "images",
        ".mp4" | ".avi" | ".mov" => "videos",
        ".mp3" | ".wav" | ".ogg" => "audio",
        ".zip" | ".rar" | ".7z" => "archives",
        ".cs" | ".js" | ".ts" | ".html" | ".css" | ".json" => "code",
        _ => "other",
    }
}

/// MIME type for an extension.
pub fn mime_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".doc" => "application/msword",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xls" => "application/vnd.ms-excel",
        ".pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".ppt" => "application/vnd.ms-powerpoint",
        ".pdf" => "application/pdf",
        ".md" => "text/markdown",
        ".txt" | ".cs" => "text/plain",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".mp4" => "video/mp4",
        ".avi" => "video/x-msvideo",
        ".mov" => "video/quicktime",
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".ogg" => "audio/ogg",
        ".zip" => "application/zip",
        ".rar" => "application/vnd.rar",
        ".7z" => "application/x-7z-compressed",
        ".html" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".ts" => "application/typescript",
        ".json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut number = bytes as f64;
    let mut counter = 0;
    while (number / 1024.0).round() >= 1.0 && counter < SUFFIXES.len() - 1 {
        number /= 1024.0;
        counter += 1;
    }
    format!("{:.1} {}", number, SUFFIXES[counter])
}
