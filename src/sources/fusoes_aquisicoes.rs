//! Fusões e Aquisições (`fusoesaquisicoes.com`), a WordPress site that
//! blocks bursts of traffic. Every request to it is paced.
//!
//! The primary strategy is the site search. When that is blocked the crawler
//! falls back to the plain news category listing, which ignores the query, so
//! its items go through [`crate::utils::is_relevant`].

use super::{ArticlePage, ResultItem, collect_article, collect_results, plus_encode};

pub const BASE_URL: &str = "https://fusoesaquisicoes.com";
const NEWS_PATH: &str = "/category/noticias";

const RESULT_ITEMS: &[&str] = &["article.post", "article"];
const RESULT_LINKS: &[&str] = &["h2.entry-title a", ".entry-title a"];
const RESULT_DATES: &[&str] = &[".entry-date", "time"];

const ARTICLE_TITLES: &[&str] = &["h1.entry-title", "h1"];
const ARTICLE_DATES: &[&str] = &[".entry-date", "time"];
const ARTICLE_BODIES: &[&str] = &[".entry-content p", ".entry-content"];

pub fn search_url(page: u32, query: &str) -> String {
    let q = plus_encode(query);
    if page > 1 {
        format!("{BASE_URL}/page/{page}/?s={q}")
    } else {
        format!("{BASE_URL}/?s={q}")
    }
}

pub fn listing_url(page: u32) -> String {
    if page > 1 {
        format!("{BASE_URL}{NEWS_PATH}/page/{page}/")
    } else {
        format!("{BASE_URL}{NEWS_PATH}")
    }
}

pub fn parse_results(html: &str) -> Vec<ResultItem> {
    collect_results(html, BASE_URL, RESULT_ITEMS, RESULT_LINKS, RESULT_DATES)
}

pub fn parse_article(html: &str) -> ArticlePage {
    collect_article(html, ARTICLE_TITLES, ARTICLE_DATES, ARTICLE_BODIES)
}
