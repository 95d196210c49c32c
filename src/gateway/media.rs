//! Media resource detection.
//!
//! A file-extension-to-MIME table drives the plain engine's default `Accept`
//! header, its extended timeout for large media, and the binary/text decision
//! when a response must cross a string-only transport.

/// Extension → MIME type table for commonly proxied media.
const MEDIA_MIME_TYPES: &[(&str, &str)] = &[
    // Images
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    // Audio
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("aac", "audio/aac"),
    ("m4a", "audio/mp4"),
    ("ogg", "audio/ogg"),
    // Video
    ("mp4", "video/mp4"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("m3u8", "application/vnd.apple.mpegurl"),
    // Text-ish documents
    ("lrc", "text/plain"),
    ("srt", "text/plain"),
    ("txt", "text/plain"),
];

/// Extensions treated as media even without a MIME table entry.
const EXTRA_MEDIA_EXTENSIONS: &[&str] = &[
    "wma", "wmv", "flv", "ts", "pdf", "doc", "docx",
];

/// Extract the lower-cased extension of a URL's path, if any.
fn extension_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    let ext = path.rsplit('/').next()?.rsplit_once('.')?.1.to_string();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Whether a URL points at a media resource, by extension.
pub fn is_media_url(url: &str) -> bool {
    match extension_of(url) {
        Some(ext) => {
            MEDIA_MIME_TYPES.iter().any(|(e, _)| *e == ext)
                || EXTRA_MEDIA_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// MIME type for a URL's extension, if the table knows it.
pub fn mime_for_url(url: &str) -> Option<&'static str> {
    let ext = extension_of(url)?;
    MEDIA_MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}
