use std::path::Path;

/// Extracts the file extension from a filename and converts it to lowercase.
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Make a user-supplied name usable as a single file name component.
///
/// Separators, reserved punctuation and control characters become `_`.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "file".to_string(),
        _ => cleaned,
    }
}

/// Keep only the final component of an uploaded filename, sanitized.
pub fn upload_basename(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    sanitize_file_stem(last)
}

/// Display name derived from an uploaded filename when none is supplied.
pub fn stem_of(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| filename.to_string())
}

/// Normalise a tag list: trim, drop blanks and duplicates, keep first-seen order.
/// A single value may carry several comma-separated tags.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for value in raw {
        for tag in value.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(get_file_extension("Photo.PNG").as_deref(), Some("png"));
        assert_eq!(get_file_extension("README"), None);
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_file_stem("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_stem(" .. "), "file");
        assert_eq!(sanitize_file_stem("Rack 1"), "Rack 1");
    }

    #[test]
    fn upload_basename_strips_client_directories() {
        assert_eq!(upload_basename("C:\\Users\\me\\diagram.png"), "diagram.png");
        assert_eq!(upload_basename("../../etc/passwd"), "passwd");
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        assert_eq!(normalize_tags(["infra", " v1 ", "infra", ""]), vec!["infra", "v1"]);
        assert_eq!(normalize_tags(["infra,v1"]), vec!["infra", "v1"]);
        assert!(normalize_tags(Vec::<String>::new()).is_empty());
    }
}
