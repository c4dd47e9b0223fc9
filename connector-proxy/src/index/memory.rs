//! In-memory term-frequency index.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{IndexDocument, IndexError, SemanticIndex};
use crate::types::Candidate;

/// Document template labels and filler words, ignored when matching.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "by", "connector", "description", "for", "from", "function", "in",
    "is", "it", "me", "my", "of", "on", "or", "path", "please", "the", "to", "with",
];

type TermVector = HashMap<String, f64>;

#[derive(Debug, Clone)]
struct Entry {
    document: IndexDocument,
    vector: TermVector,
}

/// Term-frequency cosine index held in memory.
///
/// Entries are keyed by document id, so ordering among equal distances is
/// stable by id.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn entry(document: IndexDocument) -> Entry {
        let vector = term_vector(&document.text);
        Entry { document, vector }
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Candidate>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = term_vector(query);
        let entries = self.entries.read().await;

        let mut scored: Vec<(f64, &Entry)> = entries
            .values()
            .map(|entry| {
                let distance = (1.0 - cosine_similarity(&query_vector, &entry.vector)).clamp(0.0, 2.0);
                (distance, entry)
            })
            .collect();
        // BTreeMap iteration is already id-ordered; a stable sort keeps ties in that order.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let candidates: Vec<Candidate> = scored
            .into_iter()
            .take(top_k)
            .map(|(distance, entry)| Candidate {
                operation: entry.document.operation.clone(),
                description: entry.document.text.clone(),
                distance,
            })
            .collect();
        debug!("index search returned {} candidate(s)", candidates.len());
        Ok(candidates)
    }

    async fn add(&self, documents: Vec<IndexDocument>) -> Result<(), IndexError> {
        let mut entries = self.entries.write().await;
        for document in documents {
            entries.insert(document.id.clone(), Self::entry(document));
        }
        Ok(())
    }

    async fn delete_by_connector(&self, connector_id: &str) -> Result<usize, IndexError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.document.operation.connector_id != connector_id);
        Ok(before - entries.len())
    }

    async fn replace_connector(
        &self,
        connector_id: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<(), IndexError> {
        let prepared: Vec<Entry> = documents.into_iter().map(Self::entry).collect();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.document.operation.connector_id != connector_id);
        for entry in prepared {
            entries.insert(entry.document.id.clone(), entry);
        }
        Ok(())
    }
}

/// Lowercase word tokens, with camelCase identifiers split into words.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut prev_was_lower = false;
        for c in raw.chars() {
            if c.is_uppercase() && prev_was_lower && !current.is_empty() {
                push_token(&mut tokens, &current);
                current.clear();
            }
            current.push(c);
            prev_was_lower = c.is_lowercase() || c.is_ascii_digit();
        }
        push_token(&mut tokens, &current);
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, word: &str) {
    let word = word.to_lowercase();
    if word.chars().count() > 1 && !STOPWORDS.contains(&word.as_str()) {
        tokens.push(word);
    }
}

fn term_vector(text: &str) -> TermVector {
    let mut vector = TermVector::new();
    for token in tokenize(text) {
        *vector.entry(token).or_insert(0.0) += 1.0;
    }
    vector
}

fn cosine_similarity(a: &TermVector, b: &TermVector) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
