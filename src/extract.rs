//! Pattern-based extraction of deal fields from Portuguese news text.
//!
//! Each field owns an ordered list of regular expressions. Lists run from the
//! most specific phrasing to generic fallbacks and the first pattern that
//! matches anywhere in the text wins, even when a later pattern would match
//! earlier in the text. Reordering a list changes results.
//!
//! Extraction is pure and never fails: a pattern that does not compile is
//! dropped (and logged) when the lists are built, and a capture that cannot be
//! normalised leaves its field empty without affecting the others.

use crate::models::{Currency, ExtractedFields, MonetaryValue, Multiple, MultipleBase};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

/// A capitalised company-name token: `Totvs`, `3R`, `S.A`, `Grupo`.
const TOKEN: &str = r"[\p{Lu}\d][\w&'-]*(?:\.[\w&'-]+)*";

/// Leading article before a subject (`A Totvs`, `o Itaú`).
const SUBJECT_ARTICLE: &str = r"(?:\b(?:[Aa]s?|[Oo]s?)\s+)?";

/// Article and descriptive noun between a verb and its object
/// (`comprou a startup Gupy`).
const OBJECT_PREFIX: &str = r"(?:(?:a|o|as|os)\s+)?(?:(?:empresa|companhia|startup|rede|fintech|varejista|operadora|gestora|plataforma)\s+)?";

/// `de`, `da`, `do`, `das`, `dos`.
const OF: &str = r"d(?:e|a|o|as|os)\s+";

const CURRENCY: &str = r"(?P<cur>R\$|US\$|U\$|USD|EUR|€)";
const AMOUNT: &str = r"(?P<num>\d{1,3}(?:\.\d{3})+(?:,\d+)?|\d+(?:,\d+)?)";
const MAGNITUDE: &str =
    r"(?P<mag>(?i:milhões|milhão|milhoes|milhao|bilhões|bilhão|bilhoes|bilhao|mi|bi))\b";

const FACTOR: &str = r"(?P<num>\d+(?:,\d+)?)\s*(?:x|vezes)\b";
const BASE: &str = r"(?P<base>(?i:ebitda|receita|faturamento))";
const BASE_ARTICLE: &str = r"(?:(?:o|a|seu|sua)\s+)?";

/// Capitalised words that open a sentence without being part of a name
/// (`Ontem Totvs adquiriu...`).
const SENTENCE_OPENERS: &[&str] = &[
    "Ontem", "Hoje", "Amanhã", "Agora", "Já", "Também", "Ainda", "Assim", "Recentemente",
    "Em", "No", "Na", "Nos", "Nas", "Neste", "Nesta", "Nesse", "Nessa", "Segundo", "Conforme",
    "Após", "Depois", "Antes", "Enquanto", "Mas", "Porém", "Então",
];

/// Multi-word entity name; connectors only count when followed by another
/// capitalised token, and a sentence-final period may close the name.
fn entity() -> String {
    format!(r"(?P<name>{TOKEN}(?:[ \t]+(?:(?:de|da|do|dos|das|e|&)[ \t]+)?{TOKEN})*\.?)")
}

fn acquirer_sources() -> Vec<String> {
    let name = entity();
    vec![
        format!(
            r"{SUBJECT_ARTICLE}{name}\s+(?:fechou|assinou)\s+(?:um\s+)?(?:acordo|contrato)\s+(?:para|de)\s+(?:adquirir|comprar|aquisição)"
        ),
        format!(
            r"{SUBJECT_ARTICLE}{name}\s+(?:anunciou|comunicou|informou|concluiu|finalizou)\s+a\s+(?:compra|aquisição)"
        ),
        format!(r"{SUBJECT_ARTICLE}{name}\s+(?:adquiriu|comprou)\b"),
        format!(r"{SUBJECT_ARTICLE}{name}\s+(?:é|será)\s+a\s+(?:compradora|adquirente)"),
    ]
}

fn acquired_sources() -> Vec<String> {
    let name = entity();
    vec![
        format!(
            r"(?:fechou|assinou)\s+(?:um\s+)?(?:acordo|contrato)\s+(?:para|de)\s+(?:adquirir|comprar)\s+{OBJECT_PREFIX}{name}"
        ),
        format!(r"anunciou\s+a\s+(?:compra|aquisição)\s+{OF}{OBJECT_PREFIX}{name}"),
        format!(
            r"(?:adquiriu|comprou)\s+(?:\d+(?:,\d+)?%\s+{OF})?{OBJECT_PREFIX}{name}"
        ),
        format!(r"{SUBJECT_ARTICLE}{name}\s+foi\s+(?:adquirida|comprada|adquirido|comprado)\b"),
        format!(
            r"{SUBJECT_ARTICLE}{name}\s+é\s+(?:a\s+empresa\s+adquirida|o\s+alvo\s+da\s+aquisição)"
        ),
        format!(r"(?:aquisição|compra)\s+{OF}{OBJECT_PREFIX}{name}"),
    ]
}

fn value_sources() -> Vec<String> {
    vec![
        format!(
            r"(?i:valor|montante|preço)\s+(?:total\s+)?(?:de|em)\s+{CURRENCY}\s*{AMOUNT}\s*{MAGNITUDE}"
        ),
        format!(
            r"(?:avaliad[ao]|estimad[ao]|transação|negócio|operação)\s+(?:em|de)\s+(?:cerca\s+de\s+)?{CURRENCY}\s*{AMOUNT}\s*{MAGNITUDE}"
        ),
        format!(r"{CURRENCY}\s*{AMOUNT}\s*{MAGNITUDE}"),
        format!(r"{AMOUNT}\s*{MAGNITUDE}\s+de\s+(?P<cur>reais|dólares|euros)"),
        // No currency symbol: the amount is kept, the currency stays unknown.
        format!(r"(?:por|valor\s+de|montante\s+de)\s+{AMOUNT}\s*{MAGNITUDE}"),
    ]
}

fn multiple_sources() -> Vec<String> {
    vec![
        format!(r"(?i:múltiplo)\s+de\s+{FACTOR}(?:\s+{BASE_ARTICLE}{BASE})?"),
        format!(r"{FACTOR}\s+{BASE_ARTICLE}{BASE}"),
        format!(r"{FACTOR}\s+(?:o\s+valor|a\s+cifra)"),
        format!(r"equivale\s+a\s+{FACTOR}"),
    ]
}

fn compile(field: &str, sources: Vec<String>) -> Vec<Regex> {
    sources
        .into_iter()
        .enumerate()
        .filter_map(|(i, src)| match Regex::new(&src) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(field, index = i, error = %e, "Dropping pattern that failed to compile");
                None
            }
        })
        .collect()
}

static ACQUIRER_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| compile("acquirer", acquirer_sources()));
static ACQUIRED_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| compile("acquired", acquired_sources()));
static VALUE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| compile("value", value_sources()));
static MULTIPLE_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| compile("multiple", multiple_sources()));

/// Run the ordered pattern list and return the index and captures of the
/// first pattern that matches.
fn first_match<'t>(patterns: &[Regex], text: &'t str) -> Option<(usize, Captures<'t>)> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(i, re)| re.captures(text).map(|caps| (i, caps)))
}

/// Extract acquirer, acquired company, deal value and valuation multiple.
///
/// The title is searched together with the body (title first, on its own
/// line) so headline phrasings like "Totvs compra Linx" are visible to the
/// same pattern lists.
pub fn extract(title: &str, body: &str) -> ExtractedFields {
    let text = format!("{}\n{}", title.trim(), body.trim());
    let fields = ExtractedFields {
        acquirer: extract_acquirer(&text),
        acquired: extract_acquired(&text),
        value: extract_value(&text),
        multiple: extract_multiple(&text),
    };
    if fields.is_empty() {
        debug!(title = %title.trim(), "No deal fields matched");
    }
    fields
}

pub fn extract_acquirer(text: &str) -> Option<String> {
    extract_entity(&ACQUIRER_PATTERNS, text)
}

pub fn extract_acquired(text: &str) -> Option<String> {
    extract_entity(&ACQUIRED_PATTERNS, text)
}

fn extract_entity(patterns: &[Regex], text: &str) -> Option<String> {
    let (_, caps) = first_match(patterns, text)?;
    caps.name("name")
        .map(|m| clean_entity(strip_sentence_openers(m.as_str())))
        .filter(|name| !name.is_empty())
}

/// Drop leading opener words and bare numbers (`Em 2024 Petrobras` becomes
/// `Petrobras`) so the name starts right where the company does.
fn strip_sentence_openers(raw: &str) -> &str {
    let is_noise =
        |token: &str| SENTENCE_OPENERS.contains(&token) || token.chars().all(|c| c.is_ascii_digit());
    let mut rest = raw.trim_start();
    loop {
        match rest.split_once(char::is_whitespace) {
            Some((head, tail)) if is_noise(head) => rest = tail.trim_start(),
            Some(_) => return rest,
            None if is_noise(rest) => return "",
            None => return rest,
        }
    }
}

/// Trim whitespace and a sentence-final period, keeping abbreviations such as
/// `S.A.` intact.
fn clean_entity(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches([',', ';', ':']);
    let mut chars = trimmed.chars().rev();
    match (chars.next(), chars.next()) {
        (Some('.'), Some(prev)) if !prev.is_uppercase() => {
            trimmed[..trimmed.len() - 1].trim_end().to_string()
        }
        _ => trimmed.to_string(),
    }
}

pub fn extract_value(text: &str) -> Option<MonetaryValue> {
    let (index, caps) = first_match(&VALUE_PATTERNS, text)?;
    let number = caps.name("num")?.as_str();
    let magnitude = caps.name("mag")?.as_str();
    let currency = caps
        .name("cur")
        .map(|m| Currency::from_token(m.as_str()))
        .unwrap_or(Currency::Unknown);

    let amount = parse_brazilian_number(number)
        .and_then(|n| n.checked_mul(magnitude_factor(magnitude)?));
    match amount {
        Some(amount) => Some(MonetaryValue {
            amount: amount.normalize(),
            currency,
        }),
        None => {
            debug!(pattern = index, number, magnitude, "Could not normalise matched value");
            None
        }
    }
}

pub fn extract_multiple(text: &str) -> Option<Multiple> {
    let (index, caps) = first_match(&MULTIPLE_PATTERNS, text)?;
    let number = caps.name("num")?.as_str();
    let Some(value) = parse_brazilian_number(number) else {
        debug!(pattern = index, number, "Could not parse matched multiple");
        return None;
    };
    let base = caps
        .name("base")
        .map(|m| MultipleBase::from_word(m.as_str()))
        .unwrap_or(MultipleBase::Unknown);
    Some(Multiple {
        value: value.normalize(),
        base,
    })
}

/// Parse `1.234,56` style numerals: `.` groups thousands, `,` is the decimal
/// separator.
pub fn parse_brazilian_number(raw: &str) -> Option<Decimal> {
    let canonical = raw.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&canonical).ok()
}

fn magnitude_factor(word: &str) -> Option<Decimal> {
    let word = word.to_lowercase();
    if word.starts_with("bi") {
        Some(Decimal::from(1_000_000_000u64))
    } else if word.starts_with("mi") {
        Some(Decimal::from(1_000_000u64))
    } else {
        None
    }
}
