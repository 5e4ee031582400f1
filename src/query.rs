//! Background-footage query derivation.
//!
//! Turns a script body and its channel metadata into an ordered,
//! deduplicated list of search phrases. Nothing here talks to the network.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{M}\p{N}]+").unwrap());

/// Lookup tables used by [`derive_queries`]. Built once and shared read-only.
///
/// `Default` is the empty table set, which is what an override file
/// deserializes into before being merged over [`QueryTables::builtin`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryTables {
    /// Channel family prefix (uppercase) -> descriptive default phrase.
    pub families: HashMap<String, String>,
    /// Topic word (lowercase, any language) -> English footage phrase.
    pub lexicon: HashMap<String, String>,
    /// Language code -> stopwords.
    pub stopwords: HashMap<String, HashSet<String>>,
    /// Family -> anchor words cycled onto keywords.
    pub anchors: HashMap<String, Vec<String>>,
    pub default_anchors: Vec<String>,
    pub fallbacks: Vec<String>,
    pub keyword_limit: usize,
}

static BUILTIN: Lazy<QueryTables> = Lazy::new(build_builtin);

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn build_builtin() -> QueryTables {
    let families = map(&[
        ("HM", "hindu temple sunrise clouds incense"),
        ("HT", "night forest fog moonlight candle ritual"),
        ("MJ", "office laptop city skyline night bokeh"),
    ]);

    let lexicon = map(&[
        // mythology
        ("mythology", "ancient temple carvings golden light"),
        ("ramayan", "ancient indian temple river sunrise"),
        ("ramayana", "ancient indian temple river sunrise"),
        ("mahabharat", "ancient battlefield dust sunset"),
        ("mahabharata", "ancient battlefield dust sunset"),
        ("krishna", "flute peacock feather temple"),
        ("shiva", "himalaya mountains snow temple"),
        ("temple", "hindu temple sunrise clouds incense"),
        ("मंदिर", "hindu temple sunrise clouds incense"),
        ("कृष्ण", "flute peacock feather temple"),
        ("शिव", "himalaya mountains snow temple"),
        // horror / occult
        ("tantra", "candle ritual dark room smoke"),
        ("ritual", "candle ritual dark room smoke"),
        ("haunted", "abandoned house fog night"),
        ("ghost", "abandoned house fog night"),
        ("horror", "dark forest fog moonlight"),
        ("भूत", "abandoned house fog night"),
        ("तंत्र", "candle ritual dark room smoke"),
        // careers
        ("resume", "resume paper desk laptop"),
        ("interview", "job interview office handshake"),
        ("job", "office workers city morning"),
        ("career", "business person city skyline"),
        ("cv", "resume paper desk laptop"),
        ("hiring", "job interview office handshake"),
        ("नौकरी", "office workers city morning"),
        ("इंटरव्यू", "job interview office handshake"),
        // nature
        ("ocean", "ocean waves aerial"),
        ("rain", "rain drops window night"),
        ("mountain", "mountain peak clouds aerial"),
        ("समुद्र", "ocean waves aerial"),
        ("बारिश", "rain drops window night"),
    ]);

    let mut stopwords = HashMap::new();
    stopwords.insert(
        "en".to_string(),
        words(&[
            "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had",
            "her", "was", "one", "our", "out", "has", "have", "him", "his", "how", "its", "may",
            "who", "did", "get", "got", "let", "she", "too", "use", "with", "that", "this",
            "they", "them", "then", "than", "there", "their", "what", "when", "where", "which",
            "while", "will", "would", "could", "should", "from", "into", "about", "after",
            "before", "been", "being", "were", "just", "like", "only", "over", "also", "some",
            "such", "very", "more", "most", "much", "many", "each", "every", "because", "these",
            "those", "here", "even", "ever", "once", "upon", "again", "still", "make", "made",
        ])
        .into_iter()
        .collect::<HashSet<_>>(),
    );
    stopwords.insert(
        "hi".to_string(),
        words(&[
            "और", "में", "है", "हैं", "का", "की", "के", "को", "से", "पर", "यह", "वह", "था", "थी",
            "थे", "एक", "भी", "तो", "लिए", "कि", "जो", "हम", "आप", "ने", "नहीं", "कर", "करते",
            "रहा", "रही", "गया", "गई", "अपने", "उनके", "उसके", "इस", "उस",
        ])
        .into_iter()
        .collect::<HashSet<_>>(),
    );

    let mut anchors = HashMap::new();
    anchors.insert("HM".to_string(), words(&["temple", "sunrise", "incense"]));
    anchors.insert("HT".to_string(), words(&["forest", "fog", "candle"]));
    anchors.insert("MJ".to_string(), words(&["office", "city", "laptop"]));

    QueryTables {
        families,
        lexicon,
        stopwords,
        anchors,
        default_anchors: words(&["cinematic", "landscape", "abstract"]),
        fallbacks: words(&[
            "abstract motion background particles",
            "nature landscape aerial",
            "city timelapse night",
        ]),
        keyword_limit: 3,
    }
}

impl QueryTables {
    pub fn builtin() -> &'static QueryTables {
        &BUILTIN
    }

    /// Built-in tables extended by a JSON file with the same shape.
    /// Entries in the file win on key conflicts; list fields replace when non-empty.
    pub async fn load_with_overrides(path: &Path) -> Result<QueryTables> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("read query tables: {}", path.display()))?;
        let extra: QueryTables = serde_json::from_str(&content)
            .with_context(|| format!("parse query tables: {}", path.display()))?;
        Ok(Self::builtin().merged(extra))
    }

    fn merged(&self, extra: QueryTables) -> QueryTables {
        let mut out = self.clone();
        for (k, v) in extra.families {
            out.families.insert(k.to_ascii_uppercase(), v);
        }
        for (k, v) in extra.lexicon {
            out.lexicon.insert(k.to_lowercase(), v);
        }
        for (lang, set) in extra.stopwords {
            out.stopwords.entry(lang).or_default().extend(set);
        }
        for (k, v) in extra.anchors {
            out.anchors.insert(k.to_ascii_uppercase(), v);
        }
        if !extra.default_anchors.is_empty() {
            out.default_anchors = extra.default_anchors;
        }
        if !extra.fallbacks.is_empty() {
            out.fallbacks = extra.fallbacks;
        }
        if extra.keyword_limit > 0 {
            out.keyword_limit = extra.keyword_limit;
        }
        out
    }

    fn anchors_for(&self, family: Option<&str>) -> &[String] {
        family
            .and_then(|f| self.anchors.get(f))
            .filter(|a| !a.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&self.default_anchors)
    }

    fn is_stopword(&self, language: &str, token: &str) -> bool {
        let lang = language.split(['-', '_']).next().unwrap_or(language);
        let in_lang = |code: &str| {
            self.stopwords
                .get(code)
                .map(|set| set.contains(token))
                .unwrap_or(false)
        };
        in_lang("en") || in_lang(&lang.to_ascii_lowercase())
    }
}

/// Ordered list of unique queries. Uniqueness ignores case and whitespace runs.
#[derive(Debug, Clone, Default)]
pub struct QueryList {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl QueryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the phrase was new and non-empty.
    pub fn push(&mut self, phrase: &str) -> bool {
        let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        if phrase.is_empty() {
            return false;
        }
        if !self.seen.insert(dedupe_key(&phrase)) {
            return false;
        }
        self.items.push(phrase);
        true
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.seen.contains(&dedupe_key(phrase))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

pub fn dedupe_key(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Family = uppercase text before the first `-`, `_` or space.
pub fn channel_family(channel_code: &str) -> Option<String> {
    let head = channel_code
        .trim()
        .split(['-', '_', ' '])
        .next()
        .unwrap_or("")
        .trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_uppercase())
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Most frequent content tokens. Ties: longer token first, then earlier occurrence.
pub fn top_keywords(text: &str, language: &str, tables: &QueryTables, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, token) in tokenize(text).into_iter().enumerate() {
        if token.chars().count() < 3 {
            continue;
        }
        if token.chars().all(|c| c.is_numeric()) {
            continue;
        }
        if tables.is_stopword(language, &token) {
            continue;
        }
        counts.entry(token).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.chars().count().cmp(&a.0.chars().count()))
            .then_with(|| a.2.cmp(&b.2))
    });
    ranked.into_iter().take(limit).map(|(t, _, _)| t).collect()
}

/// Builds the prioritized query list for one script.
pub fn derive_queries(
    script_text: &str,
    channel_code: Option<&str>,
    language: &str,
    explicit_query: Option<&str>,
    tables: &QueryTables,
) -> Vec<String> {
    let mut out = QueryList::new();

    if let Some(q) = explicit_query {
        out.push(q);
    }

    let family = channel_code.and_then(channel_family);
    if let Some(phrase) = family.as_deref().and_then(|f| tables.families.get(f)) {
        out.push(phrase);
    }

    for token in tokenize(script_text) {
        if let Some(phrase) = tables.lexicon.get(&token) {
            out.push(phrase);
        }
    }

    let anchors = tables.anchors_for(family.as_deref());
    let limit = tables.keyword_limit.min(3);
    for (i, keyword) in top_keywords(script_text, language, tables, limit)
        .iter()
        .enumerate()
    {
        match anchors.get(i % anchors.len().max(1)) {
            Some(anchor) if anchor != keyword => out.push(&format!("{keyword} {anchor}")),
            _ => out.push(keyword),
        };
    }

    for phrase in &tables.fallbacks {
        out.push(phrase);
    }
    if out.is_empty() {
        out.push("abstract background");
    }

    out.into_vec()
}
