use scraper::Selector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::host::{InterceptAction, InterceptRule, RequestClass};
use crate::pattern::UrlPattern;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid url pattern `{0}`")]
    InvalidPattern(String),
    #[error("invalid base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// CSS selectors locating the reader's page parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub render_container: String,
    pub content: String,
    pub stylesheet: String,
    pub next_page: String,
    pub end_of_book: String,
    pub book_title: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            render_container: ".preRenderContainer".to_string(),
            content: "#preRenderContent".to_string(),
            stylesheet: "style".to_string(),
            next_page: ".readerFooter_button".to_string(),
            end_of_book: ".readerFooter_ending".to_string(),
            book_title: ".readerCatalog_bookInfo_title_txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRule {
    pub pattern: UrlPattern,
    pub action: InterceptAction,
}

/// The two reader requests the network observer cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestRules {
    pub progress_report: RequestRule,
    pub chapter_fetch: RequestRule,
}

impl Default for RequestRules {
    fn default() -> Self {
        Self {
            progress_report: RequestRule {
                pattern: UrlPattern::new("https://weread.qq.com/web/book/read*"),
                action: InterceptAction::Cancel,
            },
            chapter_fetch: RequestRule {
                pattern: UrlPattern::new("https://weread.qq.com/web/book/chapter/e_*"),
                action: InterceptAction::Redirect { to: None },
            },
        }
    }
}

impl RequestRules {
    pub fn intercept_rules(&self) -> Vec<InterceptRule> {
        vec![
            InterceptRule {
                pattern: self.progress_report.pattern.clone(),
                action: self.progress_report.action.clone(),
                class: RequestClass::ProgressReport,
            },
            InterceptRule {
                pattern: self.chapter_fetch.pattern.clone(),
                action: self.chapter_fetch.action.clone(),
                class: RequestClass::ChapterFetch,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFace {
    pub family: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylesheetPreset {
    pub fonts: Vec<FontFace>,
    /// Class selector the reader styles its chapter with (`from`) and the one
    /// the assembled document uses for its sections (`to`).
    pub class_rewrite: (String, String),
    pub page_break_selector: String,
}

const FONT_BASE: &str = "https://fastly.jsdelivr.net/gh/Sec-ant/weread-scraper/public/fonts";

impl Default for StylesheetPreset {
    fn default() -> Self {
        let font = |family: &str, file: &str| FontFace {
            family: family.to_string(),
            url: format!("{FONT_BASE}/{file}.woff2"),
        };
        Self {
            fonts: vec![
                font("汉仪旗黑50S", "HYQiHei_50S"),
                font("汉仪旗黑65S", "HYQiHei_65S"),
                font("汉仪楷体", "HYKaiTiS"),
                font("方正仿宋", "FZFSJW"),
                font("PingFang SC", "PingFang-SC-Regular"),
            ],
            class_rewrite: (
                ".readerChapterContent".to_string(),
                ".preRenderContent".to_string(),
            ),
            page_break_selector: ".preRenderContent".to_string(),
        }
    }
}

impl StylesheetPreset {
    /// `@font-face` rules for every preset font.
    pub fn font_rules(&self) -> String {
        self.fonts
            .iter()
            .map(|font| {
                format!(
                    "@font-face{{font-family:\"{}\";src:url(\"{}\") format(\"woff2\");}}",
                    font.family, font.url
                )
            })
            .collect()
    }

    pub fn page_break_rule(&self) -> String {
        format!(
            "{}{{page-break-after:always;break-after:page;}}",
            self.page_break_selector
        )
    }

    /// Section class name without its leading dot.
    pub fn section_class(&self) -> &str {
        self.class_rewrite.1.trim_start_matches('.')
    }
}

/// Everything that ties the pipeline to one particular web reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub selectors: SiteSelectors,
    pub requests: RequestRules,
    pub stylesheet: StylesheetPreset,
    pub bookkeeping_attributes: Vec<String>,
    pub trivial_tag: String,
    pub lazy_source_attribute: String,
    pub default_title: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://weread.qq.com/".to_string(),
            selectors: SiteSelectors::default(),
            requests: RequestRules::default(),
            stylesheet: StylesheetPreset::default(),
            bookkeeping_attributes: vec!["data-wr-id".to_string(), "data-wr-co".to_string()],
            trivial_tag: "span".to_string(),
            lazy_source_attribute: "data-src".to_string(),
            default_title: "微信读书".to_string(),
        }
    }
}

/// Parsed selectors, built once per session.
#[derive(Debug, Clone)]
pub struct CompiledSite {
    pub base_url: Url,
    pub content: Selector,
    pub stylesheet: Selector,
}

impl SiteConfig {
    pub fn compile(&self) -> Result<CompiledSite, ConfigError> {
        let base_url = Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        for pattern in [
            &self.requests.progress_report.pattern,
            &self.requests.chapter_fetch.pattern,
        ] {
            if pattern.as_str().trim().is_empty() {
                return Err(ConfigError::InvalidPattern(pattern.as_str().to_string()));
            }
        }
        // The host-side selectors are only checked for syntax; the host page evaluates them.
        for selector in [
            &self.selectors.render_container,
            &self.selectors.next_page,
            &self.selectors.end_of_book,
            &self.selectors.book_title,
        ] {
            parse_selector(selector)?;
        }
        Ok(CompiledSite {
            base_url,
            content: parse_selector(&self.selectors.content)?,
            stylesheet: parse_selector(&self.selectors.stylesheet)?,
        })
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|err| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{err:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_site_compiles() {
        let compiled = SiteConfig::default().compile().unwrap();
        assert_eq!(compiled.base_url.as_str(), "https://weread.qq.com/");
    }

    #[test]
    fn bad_selector_is_reported() {
        let mut site = SiteConfig::default();
        site.selectors.next_page = "..[".to_string();
        let err = site.compile().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }

    #[test]
    fn preset_rules_render() {
        let preset = StylesheetPreset::default();
        assert_eq!(preset.fonts.len(), 5);
        assert!(preset.font_rules().starts_with("@font-face{font-family:\"汉仪旗黑50S\""));
        assert_eq!(
            preset.page_break_rule(),
            ".preRenderContent{page-break-after:always;break-after:page;}"
        );
        assert_eq!(preset.section_class(), "preRenderContent");
    }
}
