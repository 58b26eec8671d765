//! Data models for extracted transactions and run results.
//!
//! - [`TransactionRecord`]: one row of the output table, one per article
//! - [`ExtractedFields`]: what the field extractor found in an article's text
//! - [`SourceReport`] / [`RunResult`]: per-source outcome and the merged run
//!
//! Monetary values and multiples are kept as [`Decimal`] so that
//! `R$ 1,5 bilhão` normalises to exactly `1500000000`.

use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The three news origins a run can crawl.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    PipelineValor,
    ValorEconomico,
    FusoesAquisicoes,
}

impl Source {
    /// Fixed iteration order used for sequential runs and merge precedence.
    pub const ALL: [Source; 3] = [
        Source::PipelineValor,
        Source::ValorEconomico,
        Source::FusoesAquisicoes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Source::PipelineValor => "Pipeline Valor",
            Source::ValorEconomico => "Valor Econômico",
            Source::FusoesAquisicoes => "Fusões e Aquisições",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Brl,
    Usd,
    Eur,
    #[default]
    Unknown,
}

impl Currency {
    /// Map a matched currency token (`R$`, `US$`, `USD`, `€`, `EUR`, or a
    /// spelled-out currency word) onto the enum.
    pub fn from_token(token: &str) -> Currency {
        match token.trim().to_lowercase().as_str() {
            "r$" | "brl" | "reais" | "real" => Currency::Brl,
            "us$" | "usd" | "u$" | "dólares" | "dólar" | "dolares" => Currency::Usd,
            "€" | "eur" | "euros" | "euro" => Currency::Eur,
            _ => Currency::Unknown,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Brl => "BRL",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Unknown => "unknown",
        }
    }
}

/// The metric a valuation multiple is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultipleBase {
    Ebitda,
    Revenue,
    /// A multiple was found but no base metric was named next to it.
    Unknown,
}

impl MultipleBase {
    pub fn from_word(word: &str) -> MultipleBase {
        match word.trim().to_lowercase().as_str() {
            "ebitda" => MultipleBase::Ebitda,
            "receita" | "faturamento" => MultipleBase::Revenue,
            _ => MultipleBase::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MultipleBase::Ebitda => "EBITDA",
            MultipleBase::Revenue => "revenue",
            MultipleBase::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonetaryValue {
    /// Normalised to whole currency units (millions and billions expanded).
    pub amount: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiple {
    pub value: Decimal,
    pub base: MultipleBase,
}

/// Output of the field extractor. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub acquirer: Option<String>,
    pub acquired: Option<String>,
    pub value: Option<MonetaryValue>,
    pub multiple: Option<Multiple>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.acquirer.is_none()
            && self.acquired.is_none()
            && self.value.is_none()
            && self.multiple.is_none()
    }
}

/// One row of the output table.
///
/// Records with no extracted fields are still emitted, flagged through
/// `nothing_extracted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub url: String,
    pub title: String,
    pub published_date: Option<NaiveDate>,
    pub acquirer: Option<String>,
    pub acquired: Option<String>,
    pub value_amount: Option<Decimal>,
    pub value_currency: Currency,
    pub multiple_value: Option<Decimal>,
    pub multiple_base: Option<MultipleBase>,
    pub source: Source,
    pub nothing_extracted: bool,
}

impl TransactionRecord {
    pub fn new(
        source: Source,
        url: String,
        title: String,
        published_date: Option<NaiveDate>,
        fields: ExtractedFields,
    ) -> Self {
        let nothing_extracted = fields.is_empty();
        let (value_amount, value_currency) = match fields.value {
            Some(v) => (Some(v.amount), v.currency),
            None => (None, Currency::Unknown),
        };
        let (multiple_value, multiple_base) = match fields.multiple {
            Some(m) => (Some(m.value), Some(m.base)),
            None => (None, None),
        };
        Self {
            url,
            title,
            published_date,
            acquirer: fields.acquirer,
            acquired: fields.acquired,
            value_amount,
            value_currency,
            multiple_value,
            multiple_base,
            source,
            nothing_extracted,
        }
    }
}

/// How a single source's crawl ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Pages exhausted or the recency cutoff was reached.
    Completed,
    /// Gave up on a page after retries, or the run was cancelled first.
    /// Records gathered before that point are kept.
    Aborted { reason: String },
    /// Failed on something retrying cannot fix (bad request, rejected page).
    Errored { reason: String },
}

impl SourceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Completed => "completed",
            SourceStatus::Aborted { .. } => "aborted",
            SourceStatus::Errored { .. } => "errored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
    pub pages_fetched: usize,
    pub records: usize,
    pub articles_skipped: usize,
    /// `Some(false)` when a source that wants a login ran unauthenticated.
    pub authenticated: Option<bool>,
}

/// Everything one aggregator run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub query: String,
    pub days: u32,
    pub records: Vec<TransactionRecord>,
    pub per_source_status: BTreeMap<Source, SourceReport>,
    pub started_at: DateTime<Local>,
    pub duration: Duration,
}

impl RunResult {
    #[cfg(test)]
    pub fn status_of(&self, source: Source) -> Option<&SourceStatus> {
        self.per_source_status.get(&source).map(|r| &r.status)
    }

    pub fn count_with_status(&self, label: &str) -> usize {
        self.per_source_status
            .values()
            .filter(|r| r.status.label() == label)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_currency_tokens() {
        assert_eq!(Currency::from_token("R$"), Currency::Brl);
        assert_eq!(Currency::from_token("US$"), Currency::Usd);
        assert_eq!(Currency::from_token("USD"), Currency::Usd);
        assert_eq!(Currency::from_token("€"), Currency::Eur);
        assert_eq!(Currency::from_token("EUR"), Currency::Eur);
        assert_eq!(Currency::from_token("reais"), Currency::Brl);
        assert_eq!(Currency::from_token("ienes"), Currency::Unknown);
    }

    #[test]
    fn test_multiple_base_words() {
        assert_eq!(MultipleBase::from_word("EBITDA"), MultipleBase::Ebitda);
        assert_eq!(MultipleBase::from_word("Ebitda"), MultipleBase::Ebitda);
        assert_eq!(MultipleBase::from_word("receita"), MultipleBase::Revenue);
        assert_eq!(MultipleBase::from_word("faturamento"), MultipleBase::Revenue);
        assert_eq!(MultipleBase::from_word(""), MultipleBase::Unknown);
    }

    #[test]
    fn test_record_without_fields_is_flagged() {
        let record = TransactionRecord::new(
            Source::PipelineValor,
            "https://example.com/a".to_string(),
            "Mercado em alta".to_string(),
            None,
            ExtractedFields::default(),
        );
        assert!(record.nothing_extracted);
        assert_eq!(record.value_currency, Currency::Unknown);
        assert!(record.value_amount.is_none());
        assert!(record.multiple_base.is_none());
    }

    #[test]
    fn test_record_carries_value_and_multiple() {
        let fields = ExtractedFields {
            acquirer: Some("Totvs".to_string()),
            acquired: None,
            value: Some(MonetaryValue {
                amount: Decimal::from_str("1500000000").unwrap(),
                currency: Currency::Brl,
            }),
            multiple: Some(Multiple {
                value: Decimal::from_str("8.5").unwrap(),
                base: MultipleBase::Ebitda,
            }),
        };
        let record = TransactionRecord::new(
            Source::ValorEconomico,
            "https://example.com/b".to_string(),
            "Totvs compra".to_string(),
            NaiveDate::from_ymd_opt(2025, 5, 6),
            fields,
        );
        assert!(!record.nothing_extracted);
        assert_eq!(record.value_currency, Currency::Brl);
        assert_eq!(record.multiple_base, Some(MultipleBase::Ebitda));
        assert_eq!(record.acquirer.as_deref(), Some("Totvs"));
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&Source::FusoesAquisicoes).unwrap();
        assert_eq!(json, "\"fusoes-aquisicoes\"");
        let parsed: Source = serde_json::from_str("\"valor-economico\"").unwrap();
        assert_eq!(parsed, Source::ValorEconomico);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SourceStatus::Completed.label(), "completed");
        assert_eq!(
            SourceStatus::Aborted { reason: "x".into() }.label(),
            "aborted"
        );
        assert_eq!(
            SourceStatus::Errored { reason: "x".into() }.label(),
            "errored"
        );
    }
}
