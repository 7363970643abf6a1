use std::collections::{HashMap, HashSet};

use futures_util::future::join_all;
use stitch_logging::{stitch_debug, stitch_warn};
use url::Url;

use crate::dom::FragmentElement;
use crate::fetch::{to_data_url, AssetFetcher};
use crate::{FailureKind, FetchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFailure {
    pub url: String,
    pub error: FetchError,
}

/// Point every image at its real source; the lazy-load attribute wins over `src`.
pub fn resolve_lazy_sources(root: &mut FragmentElement, lazy_attribute: &str) {
    root.walk_mut(&mut |element| {
        if element.name != "img" {
            return;
        }
        if let Some(real) = element.remove_attr(lazy_attribute) {
            element.set_attr("src", real);
        }
    });
}

/// Image sources and background `url(...)` references, first occurrence order.
pub fn collect_asset_urls(root: &FragmentElement) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut push = |url: &str| {
        let url = url.trim();
        if url.is_empty() || url.starts_with("data:") {
            return;
        }
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    };
    root.walk(&mut |element| {
        if element.name == "img" {
            if let Some(src) = element.attr("src") {
                push(src);
            }
        }
        if let Some(style) = element.attr("style") {
            for url in background_urls(style) {
                push(&url);
            }
        }
    });
    urls
}

/// Fetch every reference concurrently. Returns `data:` URLs keyed by the
/// reference as written in the markup, plus the references that failed.
pub async fn fetch_assets(
    urls: &[String],
    base: &Url,
    fetcher: &dyn AssetFetcher,
) -> (HashMap<String, String>, Vec<AssetFailure>) {
    let fetches = urls.iter().map(|raw| async move {
        let result = match base.join(raw) {
            Ok(absolute) => fetcher.fetch(absolute.as_str()).await,
            Err(err) => Err(FetchError::new(FailureKind::InvalidUrl, err.to_string())),
        };
        (raw, result)
    });

    let mut inlined = HashMap::new();
    let mut failures = Vec::new();
    for (raw, result) in join_all(fetches).await {
        match result {
            Ok(output) => {
                stitch_debug!("inlined {} ({} bytes)", raw, output.bytes.len());
                inlined.insert(raw.clone(), to_data_url(&output));
            }
            Err(error) => {
                stitch_warn!("keeping remote reference {}: {}", raw, error);
                failures.push(AssetFailure {
                    url: raw.clone(),
                    error,
                });
            }
        }
    }
    (inlined, failures)
}

/// Swap fetched references for their `data:` URLs. Unknown references stay.
pub fn substitute_assets(root: &mut FragmentElement, inlined: &HashMap<String, String>) {
    if inlined.is_empty() {
        return;
    }
    root.walk_mut(&mut |element| {
        if element.name == "img" {
            let replacement = element
                .attr("src")
                .and_then(|src| inlined.get(src.trim()))
                .cloned();
            if let Some(data) = replacement {
                element.set_attr("src", data);
            }
        }
        if let Some(style) = element.attr("style") {
            let rewritten = rewrite_css_urls(style, inlined);
            if rewritten != style {
                element.set_attr("style", rewritten);
            }
        }
    });
}

/// `url(...)` references inside `background` and `background-image` declarations.
pub fn background_urls(style: &str) -> Vec<String> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(prop, _)| {
            let prop = prop.trim().to_ascii_lowercase();
            prop == "background" || prop == "background-image"
        })
        .flat_map(|(_, value)| css_urls(value))
        .map(|url| url.reference.to_string())
        .collect()
}

struct CssUrl<'a> {
    /// Byte range of the whole `url(...)` token.
    start: usize,
    end: usize,
    reference: &'a str,
}

fn css_urls(value: &str) -> Vec<CssUrl<'_>> {
    let lower = value.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("url(") {
        let start = from + pos;
        let inner_start = start + 4;
        let Some(close) = value[inner_start..].find(')') else {
            break;
        };
        let end = inner_start + close + 1;
        let reference = value[inner_start..end - 1]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        found.push(CssUrl {
            start,
            end,
            reference,
        });
        from = end;
    }
    found
}

fn rewrite_css_urls(style: &str, inlined: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(style.len());
    let mut last = 0;
    for url in css_urls(style) {
        if let Some(data) = inlined.get(url.reference) {
            out.push_str(&style[last..url.start]);
            out.push_str("url(\"");
            out.push_str(data);
            out.push_str("\")");
            last = url.end;
        }
    }
    out.push_str(&style[last..]);
    out
}
