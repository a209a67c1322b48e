//! Embedded page data extraction
//!
//! Channel tab and watch pages ship their initial state as a JavaScript
//! assignment inside a `<script>` tag. This module finds that assignment,
//! decodes the JSON object that follows it, and picks up the session values
//! needed for continuation requests.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::{ExtractionError, ExtractionResult};
use crate::infrastructure::config::InnertubeConfig;

pub const INITIAL_DATA: &str = "ytInitialData";
pub const PLAYER_RESPONSE: &str = "ytInitialPlayerResponse";

static SCRIPT_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("script").ok());

static API_KEY_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| compile(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#));
static CLIENT_VERSION_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#));
static CHANNEL_ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| compile(r#""externalId"\s*:\s*"([^"]+)""#));
static VERIFIED_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| compile(r#""tooltip"\s*:\s*"Verified""#));

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Invalid page data pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Assignment spellings seen in the wild, most specific first
fn assignment_patterns(variable: &str) -> Vec<Regex> {
    let name = regex::escape(variable);
    [
        format!(r"var\s+{name}\s*=\s*"),
        format!(r#"window\["{name}"\]\s*=\s*"#),
        format!(r"{name}\s*=\s*"),
    ]
    .iter()
    .filter_map(|pattern| compile(pattern))
    .collect()
}

/// Session values for browse requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnertubeSession {
    pub api_key: String,
    pub client_version: String,
    /// Whether the values were read from the page rather than the configured fallbacks
    pub from_page: bool,
}

impl InnertubeSession {
    pub fn fallback(config: &InnertubeConfig) -> Self {
        Self {
            api_key: config.fallback_api_key.clone(),
            client_version: config.fallback_client_version.clone(),
            from_page: false,
        }
    }
}

/// Everything read from one fetched HTML page
#[derive(Debug, Clone)]
pub struct PageData {
    pub initial_data: Value,
    pub session: InnertubeSession,
    pub channel_id: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct PageDataExtractor {
    innertube: InnertubeConfig,
    initial_data_patterns: Vec<Regex>,
    player_response_patterns: Vec<Regex>,
}

impl Default for PageDataExtractor {
    fn default() -> Self {
        Self::new(InnertubeConfig::default())
    }
}

impl PageDataExtractor {
    pub fn new(innertube: InnertubeConfig) -> Self {
        Self {
            innertube,
            initial_data_patterns: assignment_patterns(INITIAL_DATA),
            player_response_patterns: assignment_patterns(PLAYER_RESPONSE),
        }
    }

    /// Extract initial data plus session values from a channel tab page
    pub fn extract(&self, html: &str) -> ExtractionResult<PageData> {
        let initial_data = self.initial_data(html)?;
        Ok(PageData {
            initial_data,
            session: self.session(html),
            channel_id: capture(&CHANNEL_ID_PATTERN, html),
            verified: VERIFIED_PATTERN.as_ref().is_some_and(|re| re.is_match(html)),
        })
    }

    pub fn initial_data(&self, html: &str) -> ExtractionResult<Value> {
        embedded_json(html, INITIAL_DATA, &self.initial_data_patterns)
    }

    pub fn player_response(&self, html: &str) -> ExtractionResult<Value> {
        embedded_json(html, PLAYER_RESPONSE, &self.player_response_patterns)
    }

    /// Session values from the page, each falling back to configuration independently
    pub fn session(&self, html: &str) -> InnertubeSession {
        let api_key = capture(&API_KEY_PATTERN, html);
        let client_version = capture(&CLIENT_VERSION_PATTERN, html);
        if api_key.is_none() || client_version.is_none() {
            debug!(
                api_key_found = api_key.is_some(),
                client_version_found = client_version.is_some(),
                "using configured innertube fallbacks"
            );
        }
        let from_page = api_key.is_some() && client_version.is_some();
        InnertubeSession {
            api_key: api_key.unwrap_or_else(|| self.innertube.fallback_api_key.clone()),
            client_version: client_version.unwrap_or_else(|| self.innertube.fallback_client_version.clone()),
            from_page,
        }
    }
}

fn capture(pattern: &Lazy<Option<Regex>>, html: &str) -> Option<String> {
    pattern
        .as_ref()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Script bodies of the document, or the whole input when it has no script tags
fn script_bodies(html: &str) -> Vec<String> {
    let Some(selector) = SCRIPT_SELECTOR.as_ref() else {
        return vec![html.to_string()];
    };
    let document = Html::parse_document(html);
    let scripts: Vec<String> = document
        .select(selector)
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect();
    if scripts.is_empty() { vec![html.to_string()] } else { scripts }
}

fn embedded_json(html: &str, variable: &'static str, patterns: &[Regex]) -> ExtractionResult<Value> {
    for body in script_bodies(html) {
        for pattern in patterns {
            for found in pattern.find_iter(&body) {
                let rest = &body[found.end()..];
                if !rest.starts_with('{') {
                    continue;
                }
                // The object is followed by more script; decode only the first value
                let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(value)) if value.is_object() => return Ok(value),
                    Some(Err(e)) => debug!(variable, "embedded object failed to decode: {}", e),
                    _ => {}
                }
            }
        }
    }
    Err(ExtractionError::InitialDataNotFound {
        variable,
        tried_patterns: patterns.len(),
    })
}
