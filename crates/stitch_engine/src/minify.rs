/// Pure markup and stylesheet minification.
pub trait Minifier: Send + Sync {
    fn minify_html(&self, input: &str) -> String;
    fn minify_css(&self, input: &str) -> String;
}

/// Whitespace and comment minifier.
///
/// Only ASCII whitespace collapses; no-break spaces in text are content.
/// `pre`, `textarea`, `script` and `style` bodies pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightMinifier;

const RAW_CONTENT_TAGS: &[&str] = &["pre", "textarea", "script", "style"];

impl Minifier for LightMinifier {
    fn minify_html(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        let mut pending_space = false;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("<!--") {
                rest = after.find("-->").map_or("", |end| &after[end + 3..]);
                continue;
            }
            if rest.starts_with('<') {
                let end = tag_end(rest);
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                let tag = &rest[..end];
                push_collapsed_tag(tag, &mut out);
                rest = &rest[end..];
                if let Some(name) = raw_content_tag(tag) {
                    let close = find_closing_tag(rest, name).unwrap_or(rest.len());
                    out.push_str(&rest[..close]);
                    rest = &rest[close..];
                }
                continue;
            }
            let Some(ch) = rest.chars().next() else {
                break;
            };
            if ch.is_ascii_whitespace() {
                pending_space = !out.is_empty();
            } else {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(ch);
            }
            rest = &rest[ch.len_utf8()..];
        }
        out
    }

    fn minify_css(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut quote: Option<char> = None;
        let mut pending_space = false;
        // One entry per open block: true when it holds declarations rather than rules.
        let mut blocks: Vec<bool> = Vec::new();
        let mut parens = 0usize;
        let mut statement_start = 0;

        while let Some(ch) = chars.next() {
            if let Some(q) = quote {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
                continue;
            }
            if ch == '/' && chars.peek() == Some(&'*') {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                pending_space = true;
                continue;
            }
            if ch.is_ascii_whitespace() {
                pending_space = true;
                continue;
            }
            match ch {
                '{' | '}' | ';' | ',' => {
                    match ch {
                        '{' => blocks.push(holds_declarations(&out[statement_start..])),
                        '}' => {
                            blocks.pop();
                            if out.ends_with(';') {
                                out.pop();
                            }
                        }
                        _ => {}
                    }
                    out.push(ch);
                    if ch != ',' {
                        statement_start = out.len();
                    }
                    pending_space = false;
                }
                _ => {
                    // `a :b` is a descendant selector, but `color :red` is a declaration.
                    let tight = ch == ':' && (parens > 0 || blocks.last() == Some(&true));
                    if pending_space
                        && !tight
                        && !out.is_empty()
                        && !out.ends_with(['{', '}', ';', ',', ':'])
                    {
                        out.push(' ');
                    }
                    pending_space = false;
                    match ch {
                        '"' | '\'' => quote = Some(ch),
                        '(' => parens += 1,
                        ')' => parens = parens.saturating_sub(1),
                        _ => {}
                    }
                    out.push(ch);
                }
            }
        }
        out
    }
}

/// Style rules, `@font-face` and `@page` hold declarations; other at-rules
/// such as `@media` hold nested rules.
fn holds_declarations(prelude: &str) -> bool {
    let prelude = prelude.trim_start();
    !prelude.starts_with('@') || prelude.starts_with("@font-face") || prelude.starts_with("@page")
}

/// Byte offset just past the `>` closing the tag at the start of `input`.
fn tag_end(input: &str) -> usize {
    let mut quote: Option<char> = None;
    for (idx, ch) in input.char_indices().skip(1) {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '>' => return idx + 1,
            None => {}
        }
    }
    input.len()
}

fn push_collapsed_tag(tag: &str, out: &mut String) {
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for ch in tag.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        if ch.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && ch != '>' && !(ch == '/' && tag.ends_with("/>")) && !out.ends_with('=') {
            out.push(' ');
        }
        pending_space = false;
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }
        out.push(ch);
    }
}

fn raw_content_tag(tag: &str) -> Option<&'static str> {
    let body = tag.strip_prefix('<')?;
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if tag.ends_with("/>") {
        return None;
    }
    RAW_CONTENT_TAGS.iter().copied().find(|raw| *raw == name)
}

fn find_closing_tag(input: &str, name: &str) -> Option<usize> {
    let needle = format!("</{name}");
    input.to_ascii_lowercase().find(&needle)
}
