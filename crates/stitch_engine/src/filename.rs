const MAX_STEM_CHARS: usize = 80;

/// File name for a saved book: the title made safe on every common
/// filesystem, falling back to `default_title`, with an `.html` extension.
pub fn book_filename(title: Option<&str>, default_title: &str) -> String {
    let stem = title
        .map(sanitize_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| sanitize_stem(default_title));
    let stem = if stem.is_empty() {
        "book".to_string()
    } else {
        stem
    };
    format!("{stem}.html")
}

fn sanitize_stem(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.trim().chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        out.push(c);
    }
    let trimmed = out.trim_matches(&['_', ' ', '.'][..]);
    let mut stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    // Truncation may leave a trailing dot or space, which Windows strips silently.
    while stem.ends_with(['.', ' ']) {
        stem.pop();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    stem
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
