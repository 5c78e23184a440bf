//! Word vector table for embedding-based similarity.
//!
//! Vectors are read from the fastText `.vec` text format: an optional
//! `<count> <dims>` header line followed by `word v1 v2 ...` lines. Keys are
//! case-folded so lookups match the cluster index.

use crate::error::{DpError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Case-insensitive mapping from token to vector.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    vectors: HashMap<String, Vec<f64>>,
}

impl EmbeddingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(token, vector)` pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Vec<f64>)>,
    {
        let mut table = Self::new();
        for (token, vector) in pairs {
            table.insert(token.as_ref(), vector);
        }
        table
    }

    /// Load a `.vec` file from disk.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or a line is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading embeddings from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let table = Self::from_vec_str(&contents)?;
        info!(count = table.len(), "loaded word embeddings");
        Ok(table)
    }

    /// Parse the `.vec` text format.
    ///
    /// # Errors
    /// Returns [`DpError::MalformedEmbedding`] for non-numeric components or
    /// a word with no vector.
    pub fn from_vec_str(contents: &str) -> Result<Self> {
        let mut table = Self::new();

        for (idx, line) in contents.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let rest: Vec<&str> = parts.collect();

            // A two-number first line is the `<count> <dims>` header
            if idx == 0
                && rest.len() == 1
                && word.parse::<usize>().is_ok()
                && rest[0].parse::<usize>().is_ok()
            {
                continue;
            }

            if rest.is_empty() {
                return Err(DpError::MalformedEmbedding {
                    line: idx + 1,
                    reason: format!("token '{word}' has no vector components"),
                });
            }

            let vector = rest
                .iter()
                .map(|component| {
                    component
                        .parse::<f64>()
                        .map_err(|e| DpError::MalformedEmbedding {
                            line: idx + 1,
                            reason: format!("component '{component}': {e}"),
                        })
                })
                .collect::<Result<Vec<f64>>>()?;

            table.insert(word, vector);
        }

        Ok(table)
    }

    /// Insert or replace the vector for a token.
    pub fn insert(&mut self, token: &str, vector: Vec<f64>) {
        self.vectors.insert(token.to_lowercase(), vector);
    }

    /// Vector for a token, case-insensitive.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&[f64]> {
        self.vectors.get(&token.to_lowercase()).map(Vec::as_slice)
    }

    /// Number of tokens with a vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the table holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
