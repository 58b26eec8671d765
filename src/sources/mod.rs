//! Site adapters for the three news sources.
//!
//! The set of sources is closed, so dispatch is a `match` on [`Source`]
//! rather than a trait object. Every adapter provides the same capabilities:
//!
//! 1. **Search request**: the result-page URL for `(page, query)`, plus an
//!    alternate request used when the primary one is blocked
//! 2. **Result parsing**: article links and teaser dates from a result page
//! 3. **Article parsing**: title, date and body text from an article page
//!
//! | Source | Module | Primary | Alternate | Notes |
//! |--------|--------|---------|-----------|-------|
//! | Pipeline Valor | [`pipeline_valor`] | `/busca/?q=` (percent-encoded) | `+`-encoded query | |
//! | Valor Econômico | [`valor_economico`] | `/busca?q=` (`+`-encoded) | percent-encoded query | Login, paywall detection |
//! | Fusões e Aquisições | [`fusoes_aquisicoes`] | WordPress `?s=` search | news category listing | Paced, keyword-filtered fallback |

pub mod fusoes_aquisicoes;
pub mod pipeline_valor;
pub mod valor_economico;

use crate::models::Source;
use crate::utils::normalize_whitespace;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Primary,
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub url: String,
    pub strategy: Strategy,
    /// False when the listing ignores the query and results must be
    /// keyword-filtered locally.
    pub query_aware: bool,
}

/// One hit on a result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub url: String,
    pub teaser_title: Option<String>,
    pub teaser_date: Option<NaiveDate>,
}

/// What an article page yields before field extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePage {
    pub title: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub body: String,
    pub paywalled: bool,
}

impl Source {
    pub fn base_url(self) -> &'static str {
        match self {
            Source::PipelineValor => pipeline_valor::BASE_URL,
            Source::ValorEconomico => valor_economico::BASE_URL,
            Source::FusoesAquisicoes => fusoes_aquisicoes::BASE_URL,
        }
    }

    /// Sources that block aggressively get randomised pauses before every request.
    pub fn is_paced(self) -> bool {
        matches!(self, Source::FusoesAquisicoes)
    }

    pub fn wants_login(self) -> bool {
        matches!(self, Source::ValorEconomico)
    }

    pub fn build_search_request(self, page: u32, query: &str) -> SearchRequest {
        let url = match self {
            Source::PipelineValor => pipeline_valor::search_url(page, query),
            Source::ValorEconomico => valor_economico::search_url(page, query),
            Source::FusoesAquisicoes => fusoes_aquisicoes::search_url(page, query),
        };
        SearchRequest {
            url,
            strategy: Strategy::Primary,
            query_aware: true,
        }
    }

    /// Request to try when the primary one was answered with a blocking status.
    pub fn build_alternate_request(self, page: u32, query: &str) -> Option<SearchRequest> {
        let (url, query_aware) = match self {
            Source::PipelineValor => (pipeline_valor::alternate_url(page, query), true),
            Source::ValorEconomico => (valor_economico::alternate_url(page, query), true),
            Source::FusoesAquisicoes => (fusoes_aquisicoes::listing_url(page), false),
        };
        Some(SearchRequest {
            url,
            strategy: Strategy::Alternate,
            query_aware,
        })
    }

    pub fn parse_result_page(self, html: &str) -> Vec<ResultItem> {
        match self {
            Source::PipelineValor => pipeline_valor::parse_results(html),
            Source::ValorEconomico => valor_economico::parse_results(html),
            Source::FusoesAquisicoes => fusoes_aquisicoes::parse_results(html),
        }
    }

    pub fn parse_article(self, html: &str) -> ArticlePage {
        match self {
            Source::PipelineValor => pipeline_valor::parse_article(html),
            Source::ValorEconomico => valor_economico::parse_article(html),
            Source::FusoesAquisicoes => fusoes_aquisicoes::parse_article(html),
        }
    }
}

/// Query encoded as `a%20b`.
pub(crate) fn percent_encode(query: &str) -> String {
    urlencoding::encode(query.trim()).into_owned()
}

/// Query encoded as a form value, `a+b`.
pub(crate) fn plus_encode(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect()
}

/// Parse a list of CSS selectors, dropping (and logging) any that are invalid.
pub(crate) fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = s, error = %e, "Invalid selector");
                None
            }
        })
        .collect()
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first element matched by the first selector that matches.
pub(crate) fn first_text(scope: ElementRef<'_>, candidates: &[Selector]) -> Option<String> {
    candidates.iter().find_map(|sel| {
        scope
            .select(sel)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

pub(crate) fn first_attr(scope: ElementRef<'_>, candidates: &[Selector], attr: &str) -> Option<String> {
    candidates.iter().find_map(|sel| {
        scope
            .select(sel)
            .find_map(|el| el.value().attr(attr).map(str::to_string))
    })
}

/// Teaser date from a date element: the `datetime` attribute wins over text.
pub(crate) fn element_date(scope: ElementRef<'_>, candidates: &[Selector]) -> Option<NaiveDate> {
    first_attr(scope, candidates, "datetime")
        .and_then(|raw| crate::recency::parse_published_date(&raw))
        .or_else(|| {
            first_text(scope, candidates)
                .and_then(|raw| crate::recency::parse_published_date(&raw))
        })
}

/// Shared result-page walk: one [`ResultItem`] per matched container that
/// has a resolvable link.
pub(crate) fn collect_results(
    html: &str,
    base: &str,
    containers: &[&str],
    links: &[&str],
    dates: &[&str],
) -> Vec<ResultItem> {
    let Ok(base_url) = Url::parse(base) else {
        warn!(base, "Invalid base URL");
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let link_sel = selectors(links);
    let date_sel = selectors(dates);

    let mut items: Vec<ResultItem> = Vec::new();
    for container in selectors(containers) {
        for element in document.select(&container) {
            let Some(href) = first_attr(element, &link_sel, "href") else {
                continue;
            };
            let Ok(resolved) = base_url.join(href.trim()) else {
                continue;
            };
            let url = resolved.to_string();
            if items.iter().any(|i| i.url == url) {
                continue;
            }
            items.push(ResultItem {
                url,
                teaser_title: first_text(element, &link_sel),
                teaser_date: element_date(element, &date_sel),
            });
        }
        if !items.is_empty() {
            break;
        }
    }
    items
}

/// Shared article-page walk. Body paragraphs are joined with a space.
pub(crate) fn collect_article(
    html: &str,
    titles: &[&str],
    dates: &[&str],
    bodies: &[&str],
) -> ArticlePage {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = selectors(bodies)
        .iter()
        .map(|sel| {
            root.select(sel)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    ArticlePage {
        title: first_text(root, &selectors(titles)),
        published_date: element_date(root, &selectors(dates)),
        body,
        paywalled: false,
    }
}
