//! MIME type and file extension mapping.

/// Known extension ↔ MIME type pairs, most common types first.
const MIME_TABLE: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("xml", "text/xml"),
    ("ics", "text/calendar"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("avi", "video/x-msvideo"),
    ("eml", "message/rfc822"),
];

/// Fallback type for unknown extensions.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Guesses the MIME type from a file name's extension.
#[must_use]
pub fn mime_for_filename(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or_default();
    let ext = ext.to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or(DEFAULT_MIME, |(_, mime)| mime)
}

/// Returns the usual file extension (with dot) for a MIME type.
#[must_use]
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.trim().to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(ext, _)| *ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_filename() {
        assert_eq!(mime_for_filename("photo.JPG"), "image/jpeg");
        assert_eq!(mime_for_filename("report.pdf"), "application/pdf");
        assert_eq!(mime_for_filename("noext"), DEFAULT_MIME);
        assert_eq!(mime_for_filename("weird.xyz"), DEFAULT_MIME);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png"), Some("png"));
        assert_eq!(extension_for_mime("IMAGE/PNG"), Some("png"));
        assert_eq!(extension_for_mime("application/unknown"), None);
    }
}
