use url::Url;

/// Convert a string to a sanitized filename
pub fn sanitize_filename(name: &str) -> String {
    let mut name: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '?' | '&' | '=' | '#' | '%' | '*' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Hidden files and relative components are not allowed
    while name.starts_with('.') {
        name.remove(0);
    }
    if name.is_empty() {
        name = "download".to_string();
    }

    // Limit filename length
    truncate_chars(&name, 100).to_string()
}

/// Best-effort filename taken from the last path segment of a URL
pub fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    if decoded.is_empty() {
        "download".to_string()
    } else {
        decoded
    }
}

/// Longest prefix of `s` holding at most `max` characters
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
