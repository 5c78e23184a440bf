//! Candidate clustering index.
//!
//! Maps a token to the other members of its semantic category. Lookups are
//! case-insensitive; members keep their original casing for output.

use crate::embeddings::EmbeddingTable;
use crate::error::Result;
use crate::similarity::SimilarityChain;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Most alternatives taken from one matching token during similarity search.
const SIMILAR_PER_MATCH: usize = 3;
/// Most candidates returned by similarity search.
const SIMILAR_MAX: usize = 5;
/// Largest length difference (in characters) for a similarity-search match.
const SIMILAR_MAX_LEN_DIFF: usize = 2;

const DEFAULT_TAXONOMY: &[(&str, &[&str])] = &[
    (
        "countries",
        &[
            "Canada", "America", "Mexico", "France", "Germany", "Italy", "Spain", "Brazil",
            "Argentina", "Japan", "China", "India", "Australia", "Russia",
        ],
    ),
    (
        "body_parts",
        &[
            "Hand", "Eyes", "Feet", "Head", "Arm", "Leg", "Shoulder", "Knee", "Elbow", "Finger",
            "Toe", "Chest", "Back", "Neck",
        ],
    ),
    (
        "colors",
        &[
            "Red", "Blue", "Green", "Yellow", "Purple", "Orange", "Pink", "Brown", "Black",
            "White", "Gray", "Cyan", "Magenta", "Lime",
        ],
    ),
    (
        "animals",
        &[
            "Dog", "Cat", "Bird", "Fish", "Horse", "Cow", "Pig", "Sheep", "Lion", "Tiger", "Bear",
            "Wolf", "Fox", "Rabbit",
        ],
    ),
    (
        "professions",
        &[
            "Doctor",
            "Teacher",
            "Engineer",
            "Lawyer",
            "Nurse",
            "Police",
            "Firefighter",
            "Chef",
            "Artist",
            "Writer",
            "Scientist",
            "Manager",
        ],
    ),
    (
        "cities",
        &[
            "New York", "London", "Paris", "Tokyo", "Berlin", "Madrid", "Rome", "Beijing",
            "Sydney", "Moscow", "Toronto", "Chicago",
        ],
    ),
    (
        "emotions",
        &[
            "Happy",
            "Sad",
            "Angry",
            "Excited",
            "Calm",
            "Nervous",
            "Proud",
            "Disappointed",
            "Grateful",
            "Confused",
            "Surprised",
            "Content",
        ],
    ),
    (
        "food",
        &[
            "Pizza", "Burger", "Pasta", "Sushi", "Salad", "Sandwich", "Soup", "Steak", "Chicken",
            "Fish", "Bread", "Rice",
        ],
    ),
];

/// A named category and its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category name, e.g. `countries`
    pub name: String,
    /// Members in stored order
    #[serde(default)]
    pub members: Vec<String>,
}

/// The set of categories an index is seeded from.
///
/// TOML form:
///
/// ```toml
/// [[category]]
/// name = "colors"
/// members = ["Red", "Blue"]
/// ```
///
/// JSON accepts either a list of `{name, members}` objects or a map from
/// label to members, the shape written by offline clustering jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    /// Categories in index order
    #[serde(rename = "category", default)]
    pub categories: Vec<Category>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTaxonomy {
    List(Vec<Category>),
    Map(BTreeMap<String, Vec<String>>),
}

impl Taxonomy {
    /// The built-in taxonomy: countries, body parts, colors, animals,
    /// professions, cities, emotions and food.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            categories: DEFAULT_TAXONOMY
                .iter()
                .map(|(name, members)| Category {
                    name: (*name).to_string(),
                    members: members.iter().map(|m| (*m).to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Load a taxonomy file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading taxonomy from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    /// Parse the TOML form.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Parse either JSON form.
    ///
    /// Map keys that are all integers (cluster labels) are ordered
    /// numerically, otherwise lexically.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let categories = match serde_json::from_str::<JsonTaxonomy>(contents)? {
            JsonTaxonomy::List(categories) => categories,
            JsonTaxonomy::Map(map) => {
                let mut categories: Vec<Category> = map
                    .into_iter()
                    .map(|(name, members)| Category { name, members })
                    .collect();
                if categories.iter().all(|c| c.name.parse::<i64>().is_ok()) {
                    categories.sort_by_key(|c| c.name.parse::<i64>().unwrap_or_default());
                }
                categories
            }
        };
        Ok(Self { categories })
    }
}

#[derive(Debug, Clone)]
struct Cluster {
    name: String,
    members: Vec<String>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    key: String,
    cluster: usize,
    alternatives: Vec<String>,
}

/// Case-insensitive index from token to replacement candidates.
#[derive(Debug)]
pub struct ClusterIndex {
    clusters: Vec<Cluster>,
    /// Indexed tokens in insertion order; similarity search scans this
    entries: Vec<IndexEntry>,
    lookup: HashMap<String, usize>,
    similarity: SimilarityChain,
}

impl Default for ClusterIndex {
    fn default() -> Self {
        Self::from_taxonomy(Taxonomy::builtin())
    }
}

impl ClusterIndex {
    /// Index the built-in taxonomy with edit-distance similarity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an arbitrary taxonomy with edit-distance similarity.
    ///
    /// A token listed in more than one category moves to the last one that
    /// lists it, keeping its scan position.
    #[must_use]
    pub fn from_taxonomy(taxonomy: Taxonomy) -> Self {
        let mut index = Self {
            clusters: Vec::new(),
            entries: Vec::new(),
            lookup: HashMap::new(),
            similarity: SimilarityChain::edit_distance_only(),
        };

        for category in taxonomy.categories {
            let cluster = index.cluster_id_or_insert(&category.name);
            for member in category.members {
                index.claim_member(cluster, member);
            }
            index.rebuild_alternatives(cluster);
        }

        info!(
            clusters = index.clusters.len(),
            tokens = index.entries.len(),
            "built cluster index"
        );
        index
    }

    /// Replace the similarity chain.
    #[must_use]
    pub fn with_similarity(mut self, similarity: SimilarityChain) -> Self {
        self.similarity = similarity;
        self
    }

    /// Put embedding similarity ahead of edit distance.
    #[must_use]
    pub fn with_embeddings(self, table: EmbeddingTable) -> Self {
        self.with_similarity(SimilarityChain::with_embeddings(table))
    }

    /// Candidate replacements for a token.
    ///
    /// Known tokens get the rest of their category in stored order. Unknown
    /// tokens fall back to [`ClusterIndex::find_similar`].
    #[must_use]
    pub fn find_candidates(&self, token: &str) -> Vec<String> {
        let key = token.to_lowercase();
        match self.lookup.get(&key) {
            Some(&entry) => self.entries[entry].alternatives.clone(),
            None => self.find_similar(&key),
        }
    }

    /// Heuristic candidates for a token that is not indexed.
    ///
    /// Scans indexed tokens in index order and keeps those with the same
    /// first character and a length within two characters, taking up to
    /// three alternatives from each match and five overall. Order follows
    /// the scan, so clusters seeded earlier win ties; this is a positional
    /// bias, not a similarity ranking. Two matches from the same category
    /// can contribute the same alternative twice.
    #[must_use]
    pub fn find_similar(&self, token: &str) -> Vec<String> {
        let key = token.to_lowercase();
        let Some(first) = key.chars().next() else {
            return Vec::new();
        };
        let len = key.chars().count();

        let mut found: Vec<String> = Vec::new();
        for entry in &self.entries {
            if entry.key.chars().next() != Some(first)
                || entry.key.chars().count().abs_diff(len) > SIMILAR_MAX_LEN_DIFF
            {
                continue;
            }
            for alternative in entry.alternatives.iter().take(SIMILAR_PER_MATCH) {
                found.push(alternative.clone());
                if found.len() == SIMILAR_MAX {
                    return found;
                }
            }
        }
        found
    }

    /// Add a token to an existing category.
    ///
    /// Returns `false` without changing anything when the token is already
    /// indexed (case-insensitive), is blank, or the category does not exist.
    pub fn add_token(&mut self, token: &str, category: &str) -> bool {
        let Some(cluster) = self.clusters.iter().position(|c| c.name == category) else {
            debug!(category, "add_token ignored: unknown category");
            return false;
        };
        if !self.insert_member(cluster, token.to_string()) {
            return false;
        }
        self.rebuild_alternatives(cluster);
        true
    }

    /// Similarity of two tokens in `[0, 1]` via the similarity chain.
    #[must_use]
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.similarity.score(a, b)
    }

    /// Category a token belongs to, case-insensitive.
    #[must_use]
    pub fn category_of(&self, token: &str) -> Option<&str> {
        self.lookup
            .get(&token.to_lowercase())
            .map(|&entry| self.clusters[self.entries[entry].cluster].name.as_str())
    }

    /// Whether the token is indexed, case-insensitive.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.lookup.contains_key(&token.to_lowercase())
    }

    /// Members of a category in stored order.
    #[must_use]
    pub fn members(&self, category: &str) -> Option<&[String]> {
        self.clusters
            .iter()
            .find(|c| c.name == category)
            .map(|c| c.members.as_slice())
    }

    /// Category names in index order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.clusters.iter().map(|c| c.name.as_str())
    }

    /// Member count per category.
    #[must_use]
    pub fn cluster_stats(&self) -> BTreeMap<String, usize> {
        self.clusters
            .iter()
            .map(|c| (c.name.clone(), c.members.len()))
            .collect()
    }

    /// Number of indexed tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tokens are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cluster_id_or_insert(&mut self, name: &str) -> usize {
        if let Some(id) = self.clusters.iter().position(|c| c.name == name) {
            return id;
        }
        self.clusters.push(Cluster {
            name: name.to_string(),
            members: Vec::new(),
        });
        self.clusters.len() - 1
    }

    fn insert_member(&mut self, cluster: usize, token: String) -> bool {
        let key = token.to_lowercase();
        if key.trim().is_empty() {
            return false;
        }
        if self.lookup.contains_key(&key) {
            return false;
        }
        self.lookup.insert(key.clone(), self.entries.len());
        self.entries.push(IndexEntry {
            key,
            cluster,
            alternatives: Vec::new(),
        });
        self.clusters[cluster].members.push(token);
        true
    }

    /// Like `insert_member`, but a token already indexed under another
    /// category is moved into `cluster`.
    fn claim_member(&mut self, cluster: usize, token: String) -> bool {
        let key = token.to_lowercase();
        let Some(&existing) = self.lookup.get(&key) else {
            return self.insert_member(cluster, token);
        };
        let previous = self.entries[existing].cluster;
        if previous == cluster {
            return false;
        }

        debug!(
            from = %self.clusters[previous].name,
            to = %self.clusters[cluster].name,
            "token listed twice, moving to later category"
        );
        self.clusters[previous]
            .members
            .retain(|m| m.to_lowercase() != key);
        self.entries[existing].cluster = cluster;
        self.clusters[cluster].members.push(token);
        self.rebuild_alternatives(previous);
        true
    }

    /// Recompute every member's candidates as the category minus itself.
    fn rebuild_alternatives(&mut self, cluster: usize) {
        let members = &self.clusters[cluster].members;
        for entry in self.entries.iter_mut().filter(|e| e.cluster == cluster) {
            entry.alternatives = members
                .iter()
                .filter(|m| m.to_lowercase() != entry.key)
                .cloned()
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_token_returns_rest_of_category() {
        let index = ClusterIndex::new();
        let candidates = index.find_candidates("Canada");

        assert_eq!(candidates.len(), 13);
        assert_eq!(candidates[0], "America");
        assert!(!candidates.iter().any(|c| c.eq_ignore_ascii_case("canada")));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let index = ClusterIndex::new();
        assert_eq!(index.find_candidates("cAnAdA"), index.find_candidates("Canada"));
        assert_eq!(index.category_of("TOKYO"), Some("cities"));
    }

    #[test]
    fn test_multiword_members() {
        let index = ClusterIndex::new();
        let candidates = index.find_candidates("new york");
        assert_eq!(candidates.len(), 11);
        assert_eq!(candidates[0], "London");
    }

    #[test]
    fn test_duplicate_token_moves_to_later_category() {
        let index = ClusterIndex::new();
        assert_eq!(index.category_of("fish"), Some("food"));

        let candidates = index.find_candidates("Fish");
        assert_eq!(candidates.len(), 11);
        assert_eq!(candidates[0], "Pizza");
        assert!(candidates.contains(&"Rice".to_string()));

        let animals = index.members("animals").expect("animals category exists");
        assert!(!animals.iter().any(|m| m == "Fish"));
        assert!(!index.find_candidates("Dog").iter().any(|c| c == "Fish"));
        assert!(index.find_candidates("Pizza").iter().any(|c| c == "Fish"));
    }

    #[test]
    fn test_repeated_member_in_same_category() {
        let taxonomy = Taxonomy {
            categories: vec![Category {
                name: "tools".to_string(),
                members: vec!["Saw".into(), "Hammer".into(), "saw".into()],
            }],
        };
        let index = ClusterIndex::from_taxonomy(taxonomy);

        assert_eq!(index.len(), 2);
        assert_eq!(index.find_candidates("saw"), vec!["Hammer"]);
    }

    #[test]
    fn test_similarity_search_for_unknown_token() {
        let index = ClusterIndex::new();
        // "Canadia" matches "canada" (c, len 6) then "china" (c, len 5)
        let candidates = index.find_candidates("Canadia");

        assert_eq!(
            candidates,
            vec!["America", "Mexico", "France", "Canada", "America"]
        );
    }

    #[test]
    fn test_similarity_search_caps_per_match() {
        let taxonomy = Taxonomy {
            categories: vec![Category {
                name: "letters".to_string(),
                members: vec!["Alpha".into(), "Beta".into(), "Gamma".into(), "Delta".into()],
            }],
        };
        let index = ClusterIndex::from_taxonomy(taxonomy);

        // Only "alpha" starts with 'a'; three of its alternatives are taken
        assert_eq!(index.find_similar("Alps"), vec!["Beta", "Gamma", "Delta"]);
    }

    #[test]
    fn test_similarity_search_no_match() {
        let index = ClusterIndex::new();
        assert!(index.find_candidates("Qqqqqqqqqqqq").is_empty());
        assert!(index.find_candidates("").is_empty());
    }

    #[test]
    fn test_add_token_rebuilds_alternatives() {
        let mut index = ClusterIndex::new();
        assert!(index.add_token("Violet", "colors"));

        let from_red = index.find_candidates("red");
        assert_eq!(from_red.last().map(String::as_str), Some("Violet"));

        let from_violet = index.find_candidates("violet");
        assert_eq!(from_violet.len(), 14);
        assert!(!from_violet.iter().any(|c| c == "Violet"));
        assert_eq!(index.cluster_stats()["colors"], 15);
    }

    #[test]
    fn test_add_token_is_noop_for_existing_or_unknown() {
        let mut index = ClusterIndex::new();
        let before = index.len();

        assert!(!index.add_token("RED", "colors"));
        assert!(!index.add_token("Red", "animals"));
        assert!(!index.add_token("Mars", "planets"));
        assert!(!index.add_token("   ", "colors"));

        assert_eq!(index.len(), before);
        assert!(index.categories().all(|c| c != "planets"));
    }

    #[test]
    fn test_cluster_stats() {
        let index = ClusterIndex::new();
        let stats = index.cluster_stats();
        assert_eq!(stats.len(), 8);
        assert_eq!(stats["countries"], 14);
        assert_eq!(stats["animals"], 13);
        assert_eq!(stats["food"], 12);
        assert_eq!(stats.values().sum::<usize>(), index.len());
    }

    #[test]
    fn test_taxonomy_from_toml() {
        let toml_str = r#"
[[category]]
name = "planets"
members = ["Mars", "Venus", "Jupiter"]

[[category]]
name = "moons"
"#;
        let taxonomy = Taxonomy::from_toml_str(toml_str).expect("parse taxonomy");
        let mut index = ClusterIndex::from_taxonomy(taxonomy);

        assert_eq!(index.find_candidates("mars"), vec!["Venus", "Jupiter"]);
        assert!(index.add_token("Europa", "moons"));
        assert!(index.find_candidates("europa").is_empty());
    }

    #[test]
    fn test_taxonomy_from_json_map_orders_numeric_labels() {
        let json = r#"{"10": ["x1", "x2"], "2": ["y1", "y2"]}"#;
        let taxonomy = Taxonomy::from_json_str(json).expect("parse json taxonomy");
        let names: Vec<&str> = taxonomy.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["2", "10"]);
    }

    #[test]
    fn test_taxonomy_from_json_list() {
        let json = r#"[{"name": "tools", "members": ["Hammer", "Saw"]}]"#;
        let taxonomy = Taxonomy::from_json_str(json).expect("parse json taxonomy");
        assert_eq!(taxonomy.categories[0].members, vec!["Hammer", "Saw"]);
    }

    #[test]
    fn test_similarity_uses_edit_distance_by_default() {
        let index = ClusterIndex::new();
        assert!((index.similarity("kitten", "sitting") - 4.0 / 7.0).abs() < 1e-9);
    }
}
