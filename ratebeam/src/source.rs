//! Pluggable exchange-rate sources and the HTTP fetch path.
//!
//! A source knows two things: where to send the GET for a currency pair,
//! and how to dig the rate out of the opaque response body. The set of
//! sources is a fixed enum selected by configuration.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::RateError;

/// A place exchange rates can be fetched from.
pub trait ExchangeRateSource: Send + Sync {
    /// The GET target for a `from` -> `to` quote.
    fn request_url(&self, from: &str, to: &str) -> String;

    /// Scan a response body for the `from` -> `to` rate.
    fn extract_rate(&self, body: &str, from: &str, to: &str) -> Result<f64, RateError>;
}

/// Concrete source selected by configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    XeCom,
}

impl SourceKind {
    pub fn build(self) -> Box<dyn ExchangeRateSource> {
        match self {
            Self::XeCom => Box::new(XeComSource),
        }
    }
}

/// Fetches a rate for a currency pair, however it likes.
#[async_trait]
pub trait RateFinder: Send + Sync {
    async fn find_rate(&self, from: &str, to: &str) -> Result<f64, RateError>;
}

/// The production finder: GET the source's URL and extract the rate from
/// the body, rounded to two decimal places.
pub struct HttpRateFinder {
    client: reqwest::Client,
    source: Box<dyn ExchangeRateSource>,
}

impl HttpRateFinder {
    pub fn new(source: Box<dyn ExchangeRateSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            source,
        }
    }
}

#[async_trait]
impl RateFinder for HttpRateFinder {
    async fn find_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let url = self.source.request_url(from, to);
        debug!(%url, "requesting exchange rate");

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let rate = self.source.extract_rate(&body, from, to)?;
        Ok(round_to_two_places(rate))
    }
}

/// Rates are recorded to cent precision, like the upstream quotes.
pub(crate) fn round_to_two_places(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

/// Scrapes xe.com's currency converter page.
///
/// The converter page shows the quote as `1 FROM = <n> TO` somewhere in
/// the markup. The extractor walks the body once: markup tags are
/// skipped, words and numbers are tokenized, and when both currency codes
/// have been seen next to a positive value with an `=` in between, the
/// rate is the target value over the source value. A candidate pair
/// without the `=` separator is dropped and the scan continues.
pub struct XeComSource;

impl ExchangeRateSource for XeComSource {
    fn request_url(&self, from: &str, to: &str) -> String {
        format!("http://www.xe.com/currencyconverter/convert/?Amount=1&From={from}&To={to}")
    }

    fn extract_rate(&self, body: &str, from: &str, to: &str) -> Result<f64, RateError> {
        let mut scan = Scan::default();

        for ch in body.chars() {
            if scan.in_tag {
                if ch == '>' {
                    scan.in_tag = false;
                }
                continue;
            }
            match ch {
                '<' => scan.in_tag = true,
                '=' => scan.has_equal = true,
                'a'..='z' | 'A'..='Z' => scan.word.push(ch),
                '0'..='9' => scan.number.push(ch),
                '.' if !scan.number.is_empty() => scan.number.push(ch),
                _ => {
                    if let Some(rate) = scan.flush_token(from, to) {
                        return Ok(rate);
                    }
                }
            }
        }

        Err(RateError::RateNotFound {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Tokenizer state for one pass over the response body.
#[derive(Default)]
struct Scan {
    in_tag: bool,
    has_equal: bool,
    word: String,
    number: String,
    numbers: Vec<String>,
    from_value: Option<f64>,
    to_value: Option<f64>,
}

impl Scan {
    /// Finish the pending word/number at a separator character. Returns
    /// the rate once both currency values are paired across an `=`.
    fn flush_token(&mut self, from: &str, to: &str) -> Option<f64> {
        if !self.number.is_empty() {
            self.numbers.push(std::mem::take(&mut self.number));
        }

        let word = std::mem::take(&mut self.word);
        if word.is_empty() {
            return None;
        }

        if self.from_value.is_none() && word.eq_ignore_ascii_case(from) {
            self.from_value = last_valid_number(&self.numbers);
            self.numbers.clear();
            match self.from_value {
                None => self.reset_candidates(),
                Some(value) if value <= 0.0 => self.reset_candidates(),
                Some(value) => {
                    if let Some(to_value) = self.to_value {
                        if self.has_equal {
                            return Some(to_value / value);
                        }
                        // candidate pair without a separating '='
                        self.reset_candidates();
                    }
                }
            }
        } else if self.to_value.is_none() && word.eq_ignore_ascii_case(to) {
            self.to_value = last_valid_number(&self.numbers);
            self.numbers.clear();
            match self.to_value {
                None => self.reset_candidates(),
                Some(value) if value <= 0.0 => self.reset_candidates(),
                Some(value) => {
                    if let Some(from_value) = self.from_value {
                        if self.has_equal {
                            return Some(value / from_value);
                        }
                        self.reset_candidates();
                    }
                }
            }
        }
        None
    }

    fn reset_candidates(&mut self) {
        self.from_value = None;
        self.to_value = None;
        self.has_equal = false;
    }
}

/// Most recent token that parses as a number, scanning backwards.
fn last_valid_number(numbers: &[String]) -> Option<f64> {
    numbers
        .iter()
        .rev()
        .find_map(|raw| raw.parse::<f64>().ok())
}
