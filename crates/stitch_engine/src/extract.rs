use std::sync::Arc;

use scraper::Html;
use stitch_logging::stitch_debug;
use thiserror::Error;

use crate::assets::{
    collect_asset_urls, fetch_assets, resolve_lazy_sources, substitute_assets, AssetFailure,
};
use crate::config::{CompiledSite, ConfigError, SiteConfig};
use crate::dom::{FragmentElement, FragmentNode};
use crate::fetch::AssetFetcher;
use crate::minify::Minifier;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("snapshot has no content element matching `{0}`")]
    MissingContent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Build the shared stylesheet from this snapshot's `<style>`, if it has one.
    pub want_stylesheet: bool,
    pub inline_assets: bool,
}

/// A cleaned page: the content element's tag and attributes plus its minified markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFragment {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub inner_html: String,
}

impl NormalizedFragment {
    pub fn open_tag(&self) -> String {
        FragmentElement {
            name: self.tag.clone(),
            attrs: self.attrs.clone(),
            children: Vec::new(),
        }
        .open_tag()
    }

    pub fn close_tag(&self) -> String {
        format!("</{}>", self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub fragment: NormalizedFragment,
    pub stylesheet: Option<String>,
    pub failed_assets: Vec<AssetFailure>,
}

struct Inner {
    site: SiteConfig,
    compiled: CompiledSite,
    fetcher: Arc<dyn AssetFetcher>,
    minifier: Arc<dyn Minifier>,
}

/// Turns render-container snapshots into document fragments.
#[derive(Clone)]
pub struct ContentExtractor {
    inner: Arc<Inner>,
}

impl ContentExtractor {
    pub fn new(
        site: SiteConfig,
        fetcher: Arc<dyn AssetFetcher>,
        minifier: Arc<dyn Minifier>,
    ) -> Result<Self, ConfigError> {
        let compiled = site.compile()?;
        Ok(Self {
            inner: Arc::new(Inner {
                site,
                compiled,
                fetcher,
                minifier,
            }),
        })
    }

    pub async fn extract(
        &self,
        snapshot: &str,
        opts: ExtractOptions,
    ) -> Result<ExtractedPage, ExtractError> {
        let inner = &*self.inner;
        let (mut content, page_css) = self.parse_snapshot(snapshot)?;
        content.remove_attr("id");

        let stylesheet = match page_css {
            Some(css) if opts.want_stylesheet => Some(self.build_stylesheet(&css)),
            _ => None,
        };

        resolve_lazy_sources(&mut content, &inner.site.lazy_source_attribute);

        let mut failed_assets = Vec::new();
        if opts.inline_assets {
            let urls = collect_asset_urls(&content);
            if !urls.is_empty() {
                stitch_debug!("fetching {} assets", urls.len());
                let (inlined, failures) =
                    fetch_assets(&urls, &inner.compiled.base_url, inner.fetcher.as_ref()).await;
                substitute_assets(&mut content, &inlined);
                failed_assets = failures;
            }
        }

        strip_attributes(&mut content, &inner.site.bookkeeping_attributes);
        collapse_trivial_runs(&mut content, &inner.site.trivial_tag);

        let inner_html = inner.minifier.minify_html(&content.inner_html());
        Ok(ExtractedPage {
            fragment: NormalizedFragment {
                tag: content.name,
                attrs: content.attrs,
                inner_html,
            },
            stylesheet,
            failed_assets,
        })
    }

    /// Copies the content element and the page's style text out of the parsed
    /// snapshot. The parsed tree stays inside this call.
    fn parse_snapshot(
        &self,
        snapshot: &str,
    ) -> Result<(FragmentElement, Option<String>), ExtractError> {
        let compiled = &self.inner.compiled;
        let html = Html::parse_fragment(snapshot);
        let content = html
            .select(&compiled.content)
            .next()
            .map(FragmentElement::from_element_ref)
            .ok_or_else(|| {
                ExtractError::MissingContent(self.inner.site.selectors.content.clone())
            })?;
        let css = html
            .select(&compiled.stylesheet)
            .next()
            .map(|style| style.text().collect::<String>())
            .filter(|css| !css.trim().is_empty());
        Ok((content, css))
    }

    fn build_stylesheet(&self, page_css: &str) -> String {
        let preset = &self.inner.site.stylesheet;
        let (from, to) = &preset.class_rewrite;
        let css = format!(
            "{}{}{}",
            preset.font_rules(),
            page_css.replace(from.as_str(), to),
            preset.page_break_rule()
        );
        self.inner.minifier.minify_css(&css)
    }
}

/// Remove the named attributes from the element and all of its descendants.
pub fn strip_attributes(root: &mut FragmentElement, names: &[String]) {
    root.walk_mut(&mut |element| {
        element
            .attrs
            .retain(|(name, _)| !names.iter().any(|strip| strip == name));
    });
}

fn is_trivial(node: &FragmentNode, tag: &str) -> bool {
    let FragmentNode::Element(element) = node else {
        return false;
    };
    element.name == tag
        && element.attrs.is_empty()
        && element
            .children
            .iter()
            .all(|child| matches!(child, FragmentNode::Text(_)))
        && element.text_content().chars().count() <= 1
}

/// Merge each run of adjacent trivial elements into the run's first element.
///
/// An element is trivial when it has the given tag, no attributes and at most
/// one character of text. Any node in between, text included, ends a run.
pub fn collapse_trivial_runs(root: &mut FragmentElement, tag: &str) {
    let children = std::mem::take(&mut root.children);
    let mut kept: Vec<FragmentNode> = Vec::with_capacity(children.len());
    let mut run_open = false;

    for child in children {
        let trivial = is_trivial(&child, tag);
        if trivial && run_open {
            if let (Some(FragmentNode::Element(head)), FragmentNode::Element(merged)) =
                (kept.last_mut(), &child)
            {
                append_text(head, &merged.text_content());
                continue;
            }
        }
        run_open = trivial;
        kept.push(child);
    }
    root.children = kept;

    for child in &mut root.children {
        if let FragmentNode::Element(element) = child {
            collapse_trivial_runs(element, tag);
        }
    }
}

fn append_text(element: &mut FragmentElement, text: &str) {
    if text.is_empty() {
        return;
    }
    match element.children.last_mut() {
        Some(FragmentNode::Text(existing)) => existing.push_str(text),
        _ => element.children.push(FragmentNode::Text(text.to_string())),
    }
}
