//! Per-source crawl: paginate search results, gate on recency, fetch and
//! extract each article.
//!
//! # State machine
//!
//! ```text
//! Paging ──page ok──▶ Collecting(items) ──item──▶ Collecting(rest)
//!   │  ▲                   │
//!   │  └──more pages───────┤
//!   │                      └──cutoff reached / last page──▶ Done
//!   ├──empty page / max pages──▶ Done
//!   ├──run cancelled──▶ Aborted (records kept)
//!   ├──transient failure after retries──▶ Aborted (records kept)
//!   └──permanent failure──▶ Errored (records kept)
//! ```
//!
//! Everything inside one crawl is sequential: a page, then each of its
//! articles in order, then the next page. A blocking status on a result page
//! gets one try with the source's alternate request before the page counts
//! as failed. Article failures only skip that article.

use crate::context::{CANCELLED, RunContext};
use crate::credentials::CredentialsProvider;
use crate::error::CrawlError;
use crate::extract::extract;
use crate::fetch::{Fetch, FetchResponse, RetryFetch};
use crate::models::{Source, SourceReport, SourceStatus, TransactionRecord};
use crate::recency::{is_past_cutoff, is_within_window};
use crate::sources::{ArticlePage, ResultItem, SearchRequest, valor_economico};
use crate::utils::{is_relevant, truncate_for_log};
use chrono::NaiveDate;
use std::collections::{HashSet, VecDeque};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

pub const UNTITLED: &str = "Título não encontrado";

/// What one crawl produced. Never an error: failures are folded into the
/// report's status.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub records: Vec<TransactionRecord>,
    pub report: SourceReport,
}

/// Where paging stands for one crawl.
#[derive(Debug)]
struct SearchCursor<'q> {
    query: &'q str,
    cutoff: NaiveDate,
    max_pages: u32,
    /// Last page fetched; 0 before the first.
    page: u32,
    seen: HashSet<String>,
}

#[derive(Debug)]
enum CrawlState {
    Paging,
    Collecting {
        items: VecDeque<ResultItem>,
        query_aware: bool,
        last_page: bool,
    },
    Done,
    Aborted(String),
    Errored(String),
}

struct Crawl<'c, F> {
    ctx: &'c RunContext<F>,
    source: Source,
    session: RetryFetch<'c, F>,
    cursor: SearchCursor<'c>,
    records: Vec<TransactionRecord>,
    pages_fetched: usize,
    articles_skipped: usize,
    authenticated: Option<bool>,
    relogin_spent: bool,
}

/// Crawl one source until its pages run out, an item predates `cutoff`, or
/// `max_pages` pages have been read.
#[instrument(level = "info", skip_all, fields(source = %source, %cutoff, max_pages))]
pub async fn crawl<F: Fetch>(
    ctx: &RunContext<F>,
    source: Source,
    query: &str,
    cutoff: NaiveDate,
    max_pages: u32,
) -> CrawlOutcome {
    let mut crawl = Crawl {
        ctx,
        source,
        session: ctx.session(source),
        cursor: SearchCursor {
            query,
            cutoff,
            max_pages,
            page: 0,
            seen: HashSet::new(),
        },
        records: Vec::new(),
        pages_fetched: 0,
        articles_skipped: 0,
        authenticated: None,
        relogin_spent: false,
    };

    debug!(base = source.base_url(), query, "Starting crawl");
    crawl.authenticate().await;

    let mut state = CrawlState::Paging;
    loop {
        state = match state {
            CrawlState::Paging => crawl.next_page().await,
            CrawlState::Collecting {
                mut items,
                query_aware,
                last_page,
            } => match items.pop_front() {
                Some(item) => {
                    crawl.collect(item, query_aware).await;
                    CrawlState::Collecting {
                        items,
                        query_aware,
                        last_page,
                    }
                }
                None if last_page => CrawlState::Done,
                None => {
                    crawl.pause_between_pages().await;
                    CrawlState::Paging
                }
            },
            terminal => return crawl.finish(terminal),
        };
    }
}

impl<'c, F: Fetch> Crawl<'c, F> {
    async fn authenticate(&mut self) {
        if !self.source.wants_login() {
            return;
        }
        let Some(credentials) = self.ctx.credentials.get_credentials(self.source) else {
            warn!("No credentials configured; crawling without login");
            self.authenticated = Some(false);
            return;
        };
        match valor_economico::login(&self.session, self.ctx.timeout, &credentials).await {
            Ok(()) => self.authenticated = Some(true),
            Err(e) => {
                warn!(error = %e, "Login failed; crawling without login");
                self.authenticated = Some(false);
            }
        }
    }

    async fn fetch_search(&self, request: &SearchRequest) -> Result<FetchResponse, CrawlError> {
        self.session.fetch(&self.ctx.get(&request.url)).await
    }

    async fn next_page(&mut self) -> CrawlState {
        if self.cursor.page >= self.cursor.max_pages {
            return CrawlState::Done;
        }
        if self.ctx.cancel.is_cancelled() {
            info!(pages = self.cursor.page, "Run cancelled; no further pages");
            return CrawlState::Aborted(CANCELLED.to_string());
        }
        let page = self.cursor.page + 1;
        let query = self.cursor.query;

        let primary = self.source.build_search_request(page, query);
        let (request, response) = match self.fetch_search(&primary).await {
            Ok(response) => (primary, response),
            Err(e) if e.is_blocking() => {
                let Some(alternate) = self.source.build_alternate_request(page, query) else {
                    return self.page_failed(page, e);
                };
                warn!(page, error = %e, url = %alternate.url, "Search blocked; trying alternate request");
                match self.fetch_search(&alternate).await {
                    Ok(response) => (alternate, response),
                    Err(e) => return self.page_failed(page, e),
                }
            }
            Err(e) => return self.page_failed(page, e),
        };

        self.cursor.page = page;
        self.pages_fetched += 1;

        let items = self.source.parse_result_page(&response.body);
        if items.is_empty() {
            info!(page, "No results on page; stopping");
            return CrawlState::Done;
        }

        let cutoff = self.cursor.cutoff;
        let reached_cutoff = items.iter().any(|i| is_past_cutoff(i.teaser_date, cutoff));
        if reached_cutoff {
            info!(page, "Page reaches past the cutoff; last page");
        }
        debug!(page, count = items.len(), strategy = ?request.strategy, "Parsed result page");

        CrawlState::Collecting {
            items: items.into(),
            query_aware: request.query_aware,
            last_page: reached_cutoff || page >= self.cursor.max_pages,
        }
    }

    fn page_failed(&self, page: u32, error: CrawlError) -> CrawlState {
        let reason = format!("page {page}: {error}");
        if error.is_transient() {
            CrawlState::Aborted(CrawlError::SourceAborted(reason).to_string())
        } else {
            CrawlState::Errored(reason)
        }
    }

    /// Fetch, extract and keep one result item if it passes the filters.
    async fn collect(&mut self, item: ResultItem, query_aware: bool) {
        if !self.cursor.seen.insert(item.url.clone()) {
            debug!(url = %item.url, "Already collected");
            return;
        }
        if !query_aware {
            let haystack = format!("{} {}", item.url, item.teaser_title.as_deref().unwrap_or(""));
            if !is_relevant(&haystack, self.cursor.query) {
                debug!(url = %item.url, "Listing item not relevant to query");
                return;
            }
        }
        let cutoff = self.cursor.cutoff;
        if !is_within_window(item.teaser_date, cutoff) {
            debug!(url = %item.url, date = ?item.teaser_date, "Older than cutoff");
            return;
        }

        let article = match self.fetch_article(&item.url).await {
            Ok(article) => article,
            Err(e) => {
                warn!(url = %item.url, error = %e, "Skipping article");
                self.articles_skipped += 1;
                return;
            }
        };

        let published_date = article.published_date.or(item.teaser_date);
        if is_past_cutoff(published_date, cutoff) {
            debug!(url = %item.url, date = ?published_date, "Article dated before cutoff");
            return;
        }
        let title = article
            .title
            .or(item.teaser_title)
            .unwrap_or_else(|| UNTITLED.to_string());

        let fields = extract(&title, &article.body);
        if fields.is_empty() {
            debug!(
                url = %item.url,
                body = %truncate_for_log(&article.body, 120),
                "Nothing extracted"
            );
        }
        self.records.push(TransactionRecord::new(
            self.source,
            item.url,
            title,
            published_date,
            fields,
        ));
    }

    /// Fetch and parse an article. A paywalled page triggers one re-login and
    /// refetch per crawl when credentials exist.
    async fn fetch_article(&mut self, url: &str) -> Result<ArticlePage, CrawlError> {
        let response = self.session.fetch(&self.ctx.get(url)).await?;
        let article = self.source.parse_article(&response.body);
        if !article.paywalled || self.relogin_spent {
            return Ok(article);
        }
        let Some(credentials) = self.ctx.credentials.get_credentials(self.source) else {
            debug!(url, "Paywalled; keeping visible text");
            return Ok(article);
        };

        self.relogin_spent = true;
        warn!(url, "Paywall detected; signing in again");
        if let Err(e) = valor_economico::login(&self.session, self.ctx.timeout, &credentials).await {
            warn!(error = %e, "Re-login failed; keeping visible text");
            return Ok(article);
        }
        self.authenticated = Some(true);
        let again = self.session.fetch(&self.ctx.get(url)).await?;
        Ok(self.source.parse_article(&again.body))
    }

    async fn pause_between_pages(&self) {
        if self.source.is_paced() || self.ctx.page_delay.is_zero() {
            return;
        }
        sleep(self.ctx.page_delay).await;
    }

    fn finish(self, terminal: CrawlState) -> CrawlOutcome {
        let status = match terminal {
            CrawlState::Aborted(reason) => {
                warn!(%reason, kept = self.records.len(), "Source aborted");
                SourceStatus::Aborted { reason }
            }
            CrawlState::Errored(reason) => {
                warn!(%reason, kept = self.records.len(), "Source errored");
                SourceStatus::Errored { reason }
            }
            _ => SourceStatus::Completed,
        };
        info!(
            status = status.label(),
            pages = self.pages_fetched,
            records = self.records.len(),
            skipped = self.articles_skipped,
            "Crawl finished"
        );
        CrawlOutcome {
            report: SourceReport {
                source: self.source,
                status,
                pages_fetched: self.pages_fetched,
                records: self.records.len(),
                articles_skipped: self.articles_skipped,
                authenticated: self.authenticated,
            },
            records: self.records,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::context::testing::instant_context;
    use crate::credentials::{CredentialSnapshot, Credentials};
    use crate::fetch::testing::{Canned, FakeFetcher};
    use crate::sources::{fusoes_aquisicoes, pipeline_valor};
    use rust_decimal::Decimal;

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 5, d)
    }

    #[tokio::test]
    async fn test_cutoff_boundary_and_early_stop() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[
                    ("/n/recent", "06/05/2025"),
                    ("/n/boundary", "01/05/2025"),
                    ("/n/old", "30/04/2025"),
                ]),
            )
            .page(
                &pipeline_url("/n/recent"),
                200,
                &pipeline_article(
                    "Alpha compra Beta",
                    "06/05/2025",
                    "A Alpha adquiriu a Beta por R$ 1,5 bilhão.",
                ),
            )
            .page(
                &pipeline_url("/n/boundary"),
                200,
                &pipeline_article("Gama e Delta", "01/05/2025", "Sem detalhes."),
            );
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status, SourceStatus::Completed);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].published_date, day(6));
        assert_eq!(outcome.records[0].acquirer.as_deref(), Some("Alpha"));
        assert_eq!(
            outcome.records[0].value_amount,
            Some(Decimal::from(1_500_000_000u64))
        );
        assert_eq!(outcome.records[1].published_date, day(1));
        assert!(outcome.records[1].nothing_extracted);
        assert_eq!(ctx.fetcher.hits(&pipeline_url("/n/old")), 0);
        assert_eq!(ctx.fetcher.hits(&pipeline_valor::search_url(2, QUERY)), 0);
    }

    #[tokio::test]
    async fn test_page_failure_keeps_earlier_records() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[("/n/a", "06/05/2025")]),
            )
            .page(
                &pipeline_url("/n/a"),
                200,
                &pipeline_article("A", "06/05/2025", "A Alpha comprou a Beta."),
            )
            .failing(&pipeline_valor::search_url(2, QUERY));
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status.label(), "aborted");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.report.pages_fetched, 1);
        // one attempt plus one retry
        assert_eq!(ctx.fetcher.hits(&pipeline_valor::search_url(2, QUERY)), 2);
    }

    #[tokio::test]
    async fn test_permanent_page_failure_is_errored() {
        let fake = FakeFetcher::new().page(&pipeline_valor::search_url(1, QUERY), 404, "");
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status.label(), "errored");
        assert!(outcome.records.is_empty());
        assert_eq!(ctx.fetcher.hits(&pipeline_valor::search_url(1, QUERY)), 1);
    }

    #[tokio::test]
    async fn test_empty_page_and_max_pages_end_crawl() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[("/n/a", "06/05/2025")]),
            )
            .page(&pipeline_valor::search_url(2, QUERY), 200, "<html><body></body></html>")
            .page(&pipeline_url("/n/a"), 200, &pipeline_article("A", "", "texto"));
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;
        assert_eq!(outcome.report.status, SourceStatus::Completed);
        assert_eq!(outcome.report.pages_fetched, 2);
        assert_eq!(ctx.fetcher.hits(&pipeline_valor::search_url(3, QUERY)), 0);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 1).await;
        assert_eq!(outcome.report.pages_fetched, 1);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 0).await;
        assert_eq!(outcome.report.pages_fetched, 0);
        assert_eq!(outcome.report.status, SourceStatus::Completed);
    }

    #[tokio::test]
    async fn test_article_failure_skips_only_that_article() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[("/n/missing", "06/05/2025"), ("/n/ok", "05/05/2025")]),
            )
            .page(&pipeline_valor::search_url(2, QUERY), 200, "")
            .page(&pipeline_url("/n/ok"), 200, &pipeline_article("Ok", "", "texto"));
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status, SourceStatus::Completed);
        assert_eq!(outcome.report.articles_skipped, 1);
        assert_eq!(outcome.records.len(), 1);
        // no article date: the teaser date is used
        assert_eq!(outcome.records[0].published_date, day(5));
    }

    #[tokio::test]
    async fn test_undated_item_is_fetched_and_title_falls_back() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[("/n/undated", "")]),
            )
            .page(&pipeline_valor::search_url(2, QUERY), 200, "")
            .page(&pipeline_url("/n/undated"), 200, "<html><body><p>nada</p></body></html>");
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.published_date, None);
        // teaser link text is the path in these fixtures
        assert_eq!(record.title, "/n/undated");
        assert!(record.nothing_extracted);
    }

    #[tokio::test]
    async fn test_blocked_search_falls_back_to_filtered_listing() {
        let fake = FakeFetcher::new()
            .page(&fusoes_aquisicoes::search_url(1, QUERY), 403, "")
            .page(
                &fusoes_aquisicoes::listing_url(1),
                200,
                &fusoes_results(&[
                    ("/noticias/zeta-compra-eta/", "Zeta compra Eta", "6 de maio de 2025"),
                    ("/noticias/balanco/", "Balanço trimestral", "6 de maio de 2025"),
                    ("/noticias/antiga-compra/", "Compra antiga", "2 de abril de 2025"),
                ]),
            )
            .page(
                &fusoes_url("/noticias/zeta-compra-eta/"),
                200,
                &fusoes_article("Zeta compra Eta", "6 de maio de 2025", "A Zeta comprou a Eta."),
            );
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::FusoesAquisicoes, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status, SourceStatus::Completed);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].acquirer.as_deref(), Some("Zeta"));
        assert_eq!(ctx.fetcher.hits(&fusoes_url("/noticias/balanco/")), 0);
        assert_eq!(ctx.fetcher.hits(&fusoes_aquisicoes::listing_url(2)), 0);
    }

    #[tokio::test]
    async fn test_blocked_everywhere_aborts() {
        let fake = FakeFetcher::new()
            .page(&fusoes_aquisicoes::search_url(1, QUERY), 403, "")
            .page(&fusoes_aquisicoes::listing_url(1), 429, "");
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::FusoesAquisicoes, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status.label(), "aborted");
        assert_eq!(outcome.report.pages_fetched, 0);
    }

    #[tokio::test]
    async fn test_valor_without_credentials_crawls_unauthenticated() {
        let fake = FakeFetcher::new().page(
            &valor_economico::search_url(1, QUERY),
            200,
            "<html><body></body></html>",
        );
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::ValorEconomico, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.status, SourceStatus::Completed);
        assert_eq!(outcome.report.authenticated, Some(false));
        assert_eq!(ctx.fetcher.hits(valor_economico::LOGIN_URL), 0);
    }

    #[tokio::test]
    async fn test_valor_paywall_triggers_one_relogin() {
        let login_page = r#"<form action="/auth"><input type="hidden" name="t" value="1"><input type="password" name="password"></form>"#;
        let article_url = "https://valor.globo.com/empresas/noticia/a.ghtml";
        let paywalled = r#"<h1 class="content-head__title">Teta compra Iota</h1>
            <div class="content-text"><p>Resumo.</p></div>
            <p>Para continuar lendo</p><p>Faça login ou assine</p>"#;
        let full = r#"<h1 class="content-head__title">Teta compra Iota</h1>
            <div class="content-text"><p>A Teta adquiriu a Iota por R$ 200 milhões.</p></div>"#;
        let results = r#"<div class="c-card"><a class="c-card__link" href="/empresas/noticia/a.ghtml">Teta</a>
            <div class="c-card__info"><time datetime="2025-05-06">06/05/2025</time></div></div>"#;

        let fake = FakeFetcher::new()
            .page(valor_economico::LOGIN_URL, 200, login_page)
            .page("https://login.globo.com/auth", 200, "ok")
            .page("https://valor.globo.com/minha-conta", 200, "conta")
            .page(&valor_economico::search_url(1, QUERY), 200, results)
            .page(&valor_economico::search_url(2, QUERY), 200, "")
            .once(article_url, Canned::Page(200, paywalled.to_string()))
            .page(article_url, 200, full);
        let mut ctx = instant_context(fake);
        ctx.credentials = CredentialSnapshot::empty().with(
            Source::ValorEconomico,
            Credentials::new("leitor@example.com", "segredo"),
        );

        let outcome = crawl(&ctx, Source::ValorEconomico, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.report.authenticated, Some(true));
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].acquirer.as_deref(), Some("Teta"));
        assert_eq!(
            outcome.records[0].value_amount,
            Some(Decimal::from(200_000_000u64))
        );
        assert_eq!(ctx.fetcher.hits(valor_economico::LOGIN_URL), 2);
        assert_eq!(ctx.fetcher.hits(article_url), 2);
    }

    #[tokio::test]
    async fn test_duplicate_links_are_fetched_once() {
        let fake = FakeFetcher::new()
            .page(
                &pipeline_valor::search_url(1, QUERY),
                200,
                &pipeline_results(&[("/n/a", "06/05/2025")]),
            )
            .page(
                &pipeline_valor::search_url(2, QUERY),
                200,
                &pipeline_results(&[("/n/a", "06/05/2025")]),
            )
            .page(&pipeline_valor::search_url(3, QUERY), 200, "")
            .page(&pipeline_url("/n/a"), 200, &pipeline_article("A", "", "texto"));
        let ctx = instant_context(fake);

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(ctx.fetcher.hits(&pipeline_url("/n/a")), 1);
    }

    #[tokio::test]
    async fn test_cancelled_crawl_stops_before_next_page() {
        let fake = FakeFetcher::new().page(
            &pipeline_valor::search_url(1, QUERY),
            200,
            &pipeline_results(&[("/n/a", "06/05/2025")]),
        );
        let ctx = instant_context(fake);
        ctx.cancel.cancel();

        let outcome = crawl(&ctx, Source::PipelineValor, QUERY, cutoff(), 5).await;

        assert_eq!(
            outcome.report.status,
            SourceStatus::Aborted {
                reason: CANCELLED.to_string()
            }
        );
        assert_eq!(outcome.report.pages_fetched, 0);
        assert!(ctx.fetcher.sent().is_empty());
    }
}
