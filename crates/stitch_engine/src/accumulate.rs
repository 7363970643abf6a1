use crate::extract::NormalizedFragment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub open_tag: String,
    pub close_tag: String,
    pub inner_html: String,
    /// Number of pages merged into this section.
    pub pages: usize,
}

impl Section {
    pub fn html(&self) -> String {
        format!("{}{}{}", self.open_tag, self.inner_html, self.close_tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentMeta {
    pub title: String,
    pub scraped_at: Option<String>,
}

/// The book being assembled: one shared stylesheet and the ordered sections.
#[derive(Debug, Clone, Default)]
pub struct DocumentAccumulator {
    stylesheet: Option<String>,
    sections: Vec<Section>,
}

impl DocumentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of a scrape session: the next page provides the stylesheet again.
    pub fn begin_session(&mut self) {
        self.stylesheet = None;
        self.sections.clear();
    }

    pub fn needs_stylesheet(&self) -> bool {
        self.stylesheet.is_none()
    }

    /// Store the session stylesheet. Only the first call has any effect.
    pub fn inject_stylesheet(&mut self, css: String) -> bool {
        if self.stylesheet.is_some() {
            return false;
        }
        self.stylesheet = Some(css);
        true
    }

    pub fn stylesheet(&self) -> Option<&str> {
        self.stylesheet.as_deref()
    }

    /// Append a page. Continuations extend the latest section; a continuation
    /// with no section to extend opens one.
    pub fn append(&mut self, fragment: NormalizedFragment, is_new_chapter: bool) {
        if !is_new_chapter {
            if let Some(current) = self.sections.last_mut() {
                current.inner_html.push_str(&fragment.inner_html);
                current.pages += 1;
                return;
            }
        }
        self.sections.push(Section {
            open_tag: fragment.open_tag(),
            close_tag: fragment.close_tag(),
            inner_html: fragment.inner_html,
            pages: 1,
        });
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn render(&self, meta: &DocumentMeta) -> String {
        let mut out = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
        out.push_str("<title>");
        out.push_str(&escape_text(&meta.title));
        out.push_str("</title>");
        if let Some(at) = &meta.scraped_at {
            out.push_str("<meta name=\"scraped-at\" content=\"");
            out.push_str(&escape_text(at).replace('"', "&quot;"));
            out.push_str("\">");
        }
        out.push_str("<style>");
        if let Some(css) = &self.stylesheet {
            out.push_str(css);
        }
        out.push_str("</style></head><body>");
        for section in &self.sections {
            out.push_str(&section.html());
        }
        out.push_str("</body></html>");
        out
    }

    /// Drop the sections; returns how many there were. The stylesheet stays
    /// until the next session.
    pub fn discard(&mut self) -> usize {
        let count = self.sections.len();
        self.sections.clear();
        count
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
