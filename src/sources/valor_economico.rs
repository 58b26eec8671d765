//! Valor Econômico (`valor.globo.com`).
//!
//! Most articles sit behind a paywall. With credentials the crawler signs in
//! through the Globo account form first; the session cookie then rides along
//! on every later request made through the same fetcher. Without a working
//! login the crawl still runs and extracts whatever teaser text is visible.

use super::{ArticlePage, ResultItem, collect_article, collect_results, percent_encode, plus_encode, selectors};
use crate::credentials::Credentials;
use crate::error::{CrawlError, Result};
use crate::fetch::{Fetch, FetchRequest, RetryFetch};
use scraper::Html;
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

pub const BASE_URL: &str = "https://valor.globo.com";
pub const LOGIN_URL: &str = "https://login.globo.com/login/438";
const ACCOUNT_PATH: &str = "/minha-conta";

const PAYWALL_MARKERS: [&str; 2] = ["Para continuar lendo", "Faça login ou assine"];

const RESULT_ITEMS: &[&str] = &[".c-card", ".widget--info"];
const RESULT_LINKS: &[&str] = &["a.c-card__link", ".widget--info__text-container a", "a"];
const RESULT_DATES: &[&str] = &[".c-card__info time", "time", ".widget--info__meta"];

const ARTICLE_TITLES: &[&str] = &["h1.content-head__title", "h1"];
const ARTICLE_DATES: &[&str] = &[
    ".content-publication-data__updated",
    "time[itemprop=datePublished]",
    "time",
];
const ARTICLE_BODIES: &[&str] = &[".content-text p", ".mc-article-body p", "article p"];

pub fn search_url(page: u32, query: &str) -> String {
    format!("{BASE_URL}/busca?q={}&page={page}", plus_encode(query))
}

pub fn alternate_url(page: u32, query: &str) -> String {
    format!("{BASE_URL}/busca?q={}&page={page}", percent_encode(query))
}

pub fn parse_results(html: &str) -> Vec<ResultItem> {
    collect_results(html, BASE_URL, RESULT_ITEMS, RESULT_LINKS, RESULT_DATES)
}

pub fn parse_article(html: &str) -> ArticlePage {
    ArticlePage {
        paywalled: is_paywalled(html),
        ..collect_article(html, ARTICLE_TITLES, ARTICLE_DATES, ARTICLE_BODIES)
    }
}

pub fn is_paywalled(html: &str) -> bool {
    PAYWALL_MARKERS.iter().all(|marker| html.contains(marker))
}

/// The sign-in form: where to post and which hidden fields to echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: String,
    pub hidden: Vec<(String, String)>,
}

/// Locate the form holding the password field and collect its hidden inputs.
/// A form without an `action` posts back to the page it came from.
pub fn parse_login_form(html: &str, page_url: &str) -> Result<LoginForm> {
    let base = Url::parse(page_url)?;
    let document = Html::parse_document(html);
    let forms = selectors(&["form"]);
    let password = selectors(&["input[type=password]", "input[name=password]"]);
    let hidden = selectors(&["input[type=hidden]"]);

    let form = forms
        .iter()
        .flat_map(|sel| document.select(sel))
        .find(|form| password.iter().any(|p| form.select(p).next().is_some()))
        .ok_or_else(|| CrawlError::Parse("login form not found".into()))?;

    let action = match form.value().attr("action").map(str::trim) {
        Some(a) if !a.is_empty() => base.join(a)?.to_string(),
        _ => base.to_string(),
    };
    let hidden = hidden
        .iter()
        .flat_map(|sel| form.select(sel))
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Ok(LoginForm { action, hidden })
}

fn looks_signed_in(final_url: &str) -> bool {
    final_url.contains("minha-conta") || final_url.contains("dashboard")
}

/// Sign in through `session`. Any failure along the way is reported as
/// [`CrawlError::Auth`].
#[instrument(level = "info", skip_all, fields(identity = %credentials.identity))]
pub async fn login<F: Fetch>(
    session: &RetryFetch<'_, F>,
    timeout: Duration,
    credentials: &Credentials,
) -> Result<()> {
    let auth = |stage: &str, e: CrawlError| CrawlError::Auth(format!("{stage}: {e}"));

    let page = session
        .fetch(&FetchRequest::get(LOGIN_URL).with_timeout(timeout))
        .await
        .map_err(|e| auth("login page", e))?;
    let page_url = if page.final_url.is_empty() {
        LOGIN_URL
    } else {
        page.final_url.as_str()
    };
    let form = parse_login_form(&page.body, page_url).map_err(|e| auth("login form", e))?;

    let mut fields = form.hidden;
    fields.push(("login".to_string(), credentials.identity.clone()));
    fields.push(("password".to_string(), credentials.secret.clone()));
    let submitted = session
        .fetch(&FetchRequest::post_form(&form.action, fields).with_timeout(timeout))
        .await
        .map_err(|e| auth("submit", e))?;
    if looks_signed_in(&submitted.final_url) {
        info!("Signed in");
        return Ok(());
    }

    let account = format!("{BASE_URL}{ACCOUNT_PATH}");
    match session
        .fetch(&FetchRequest::get(&account).with_timeout(timeout))
        .await
    {
        Ok(response) if !response.final_url.contains("login.globo.com") => {
            info!("Signed in (account page reachable)");
            Ok(())
        }
        Ok(_) => {
            warn!("Account page redirected to login; credentials rejected");
            Err(CrawlError::Auth("credentials rejected".into()))
        }
        Err(e) => Err(auth("account check", e)),
    }
}
