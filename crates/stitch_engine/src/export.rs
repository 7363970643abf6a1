use std::path::{Path, PathBuf};

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use stitch_logging::stitch_info;
use thiserror::Error;

use crate::config::{parse_selector, ConfigError};
use crate::dom::{FragmentElement, FragmentNode};
use crate::persist::{AtomicFileWriter, PersistError};

pub const MANIFEST_FILE: &str = "manifest.json";
const CHAPTER_TITLE_ATTRIBUTE: &str = "data-chapter-title";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no sections matching `{0}` in the book")]
    NoSections(String),
    #[error(transparent)]
    Selector(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("manifest encoding failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// One section of a saved book as a standalone page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPage {
    pub file_name: String,
    pub title: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub book_title: Option<String>,
    pub pages: Vec<ManifestEntry>,
}

/// Split a saved book into one page per section, each carrying the book's
/// head (stylesheet and meta) and the section's chapter title.
///
/// Pages are meant for an e-book editor that stitches them back into chapters.
pub fn split_book(
    html: &str,
    section_selector: &str,
) -> Result<(SplitManifest, Vec<SplitPage>), ExportError> {
    let section = parse_selector(section_selector)?;
    let head_selector = parse_selector("head")?;
    let title_selector = parse_selector("head > title")?;

    let document = Html::parse_document(html);
    let book_title = document
        .select(&title_selector)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty());
    let shared_head = document
        .select(&head_selector)
        .next()
        .map(head_without_title)
        .unwrap_or_default();

    let mut pages = Vec::new();
    for (index, element) in document.select(&section).enumerate() {
        let number = index + 1;
        let content = FragmentElement::from_element_ref(element);
        let title = content
            .attr(CHAPTER_TITLE_ATTRIBUTE)
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Page {number}"));
        let html = format!(
            "<!DOCTYPE html><html><head><title>{}</title>{}</head><body>{}</body></html>",
            escape_title(&title),
            shared_head,
            content.outer_html()
        );
        pages.push(SplitPage {
            file_name: format!("page{number}.html"),
            title,
            html,
        });
    }
    if pages.is_empty() {
        return Err(ExportError::NoSections(section_selector.to_string()));
    }

    let manifest = SplitManifest {
        book_title,
        pages: pages
            .iter()
            .map(|page| ManifestEntry {
                file: page.file_name.clone(),
                title: page.title.clone(),
            })
            .collect(),
    };
    Ok((manifest, pages))
}

/// Write the pages and `manifest.json` into `dir`; returns the manifest path.
pub fn write_split(
    dir: &Path,
    manifest: &SplitManifest,
    pages: &[SplitPage],
) -> Result<PathBuf, ExportError> {
    let writer = AtomicFileWriter::new(dir);
    for page in pages {
        writer.write(&page.file_name, &page.html)?;
    }
    let manifest_json = serde_json::to_string_pretty(manifest)?;
    let path = writer.write(MANIFEST_FILE, manifest_json)?;
    stitch_info!("wrote {} pages to {}", pages.len(), dir.display());
    Ok(path)
}

fn head_without_title(head: ElementRef<'_>) -> String {
    let mut head = FragmentElement::from_element_ref(head);
    head.children.retain(
        |child| !matches!(child, FragmentNode::Element(element) if element.name == "title"),
    );
    head.inner_html()
}

fn escape_title(title: &str) -> String {
    title
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
