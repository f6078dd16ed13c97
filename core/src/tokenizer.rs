use crate::{Result, Term};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"https?://\S+|www\.\S+").expect("valid regex");
    static ref EMAIL_RE: Regex = Regex::new(r"\S+@\S+").expect("valid regex");
    static ref WORD_RE: Regex = Regex::new(r"(?u)\p{L}+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","ain","all","am","an","and","any","are","aren","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","couldn",
            "did","didn","do","does","doesn","doing","don","down","during",
            "each","few","for","from","further",
            "had","hadn","has","hasn","have","haven","having","he","her","here","hers","herself","him","himself","his","how",
            "if","in","into","is","isn","it","its","itself",
            "just","ll","me","more","most","mustn","my","myself",
            "no","nor","not","now","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","same","shan","she","should","shouldn","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","wasn","we","were","weren","what","when","where","which","while","who","whom","why","will","with","won","would","wouldn",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Turns raw text into the ordered sequence of normalized terms.
///
/// The same implementation must be used for documents and for queries, otherwise
/// query terms will not line up with indexed terms.
pub trait Preprocessor: Send + Sync {
    /// Empty or degenerate input yields an empty sequence, not an error.
    fn normalize(&self, text: &str) -> Result<Vec<Term>>;
}

/// NFKC + lowercase, URL/e-mail stripping, letter-run extraction, stopword removal and
/// Snowball English stemming.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPreprocessor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreprocessingInfo {
    pub original_word_count: usize,
    pub processed_token_count: usize,
    pub tokens_removed: usize,
    pub sample_tokens: Vec<Term>,
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

impl TextPreprocessor {
    pub fn new() -> Self { Self }

    pub fn tokens(&self, text: &str) -> Vec<Term> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lowered = text.nfkc().collect::<String>().to_lowercase();
        let without_urls = URL_RE.replace_all(&lowered, " ");
        let cleaned = EMAIL_RE.replace_all(&without_urls, " ");

        let mut tokens = Vec::new();
        for mat in WORD_RE.find_iter(&cleaned) {
            let token = mat.as_str();
            if token.chars().count() < 2 || is_stopword(token) {
                continue;
            }
            tokens.push(STEMMER.stem(token).into_owned());
        }
        tokens
    }

    /// Word counts before and after normalization, for debugging.
    pub fn preprocessing_info(&self, text: &str) -> PreprocessingInfo {
        let original_word_count = text.split_whitespace().count();
        let tokens = self.tokens(text);
        PreprocessingInfo {
            original_word_count,
            processed_token_count: tokens.len(),
            tokens_removed: original_word_count.saturating_sub(tokens.len()),
            sample_tokens: tokens.into_iter().take(10).collect(),
        }
    }
}

impl Preprocessor for TextPreprocessor {
    fn normalize(&self, text: &str) -> Result<Vec<Term>> {
        Ok(self.tokens(text))
    }
}
