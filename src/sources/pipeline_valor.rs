//! Pipeline Valor (`pipelinevalor.globo.com`), open deal-news site.

use super::{ArticlePage, ResultItem, collect_article, collect_results, percent_encode, plus_encode};

pub const BASE_URL: &str = "https://pipelinevalor.globo.com";

const RESULT_ITEMS: &[&str] = &[".search-result-item", ".feed-post"];
const RESULT_LINKS: &[&str] = &["a.search-result-link", "a.feed-post-link", "a"];
const RESULT_DATES: &[&str] = &[".search-result-date", "time", ".feed-post-datetime"];

const ARTICLE_TITLES: &[&str] = &["h1.article-title", "h1.content-head__title", "h1"];
const ARTICLE_DATES: &[&str] = &["time.article-date", "time[datetime]", ".content-publication-data__updated"];
const ARTICLE_BODIES: &[&str] = &[".article-content", ".content-text p", "article p"];

pub fn search_url(page: u32, query: &str) -> String {
    format!("{BASE_URL}/busca/?q={}&page={page}", percent_encode(query))
}

pub fn alternate_url(page: u32, query: &str) -> String {
    format!("{BASE_URL}/busca/?q={}&page={page}", plus_encode(query))
}

pub fn parse_results(html: &str) -> Vec<ResultItem> {
    collect_results(html, BASE_URL, RESULT_ITEMS, RESULT_LINKS, RESULT_DATES)
}

pub fn parse_article(html: &str) -> ArticlePage {
    collect_article(html, ARTICLE_TITLES, ARTICLE_DATES, ARTICLE_BODIES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RESULTS: &str = r#"
        <div class="search-results">
          <div class="search-result-item">
            <a class="search-result-link" href="/negocios/noticia/2025/05/06/alpha-compra-beta.ghtml">Alpha compra Beta</a>
            <span class="search-result-date">06/05/2025 às 10:31</span>
          </div>
          <div class="search-result-item">
            <a class="search-result-link" href="https://pipelinevalor.globo.com/negocios/noticia/gama.ghtml">Gama</a>
            <span class="search-result-date">ontem</span>
          </div>
        </div>"#;

    #[test]
    fn test_search_url() {
        assert_eq!(
            search_url(2, "fusão aquisição"),
            "https://pipelinevalor.globo.com/busca/?q=fus%C3%A3o%20aquisi%C3%A7%C3%A3o&page=2"
        );
        assert!(alternate_url(2, "fusão aquisição").contains("?q=fus%C3%A3o+aquisi"));
    }

    #[test]
    fn test_parse_results() {
        let items = parse_results(RESULTS);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].url,
            "https://pipelinevalor.globo.com/negocios/noticia/2025/05/06/alpha-compra-beta.ghtml"
        );
        assert_eq!(items[0].teaser_date, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(items[1].teaser_date, None);
    }

    #[test]
    fn test_parse_article() {
        let html = r#"<html><body>
            <h1 class="article-title">Alpha compra Beta por R$ 1,5 bilhão</h1>
            <time class="article-date" datetime="2025-05-06T10:31:00-03:00">06/05/2025</time>
            <div class="article-content"><p>A Alpha adquiriu a Beta.</p></div>
        </body></html>"#;
        let page = parse_article(html);
        assert_eq!(page.title.as_deref(), Some("Alpha compra Beta por R$ 1,5 bilhão"));
        assert_eq!(page.published_date, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(page.body, "A Alpha adquiriu a Beta.");
        assert!(!page.paywalled);
    }

    #[test]
    fn test_empty_page_has_no_results() {
        assert!(parse_results("<html><body><p>Nenhum resultado</p></body></html>").is_empty());
    }
}
