//! Capability index
//!
//! A discovery layer kept alongside the registry: every registered tool is
//! tagged with a category from a closed set, tags derived from its
//! description, an inferred complexity label, and its declared input/output
//! shape. Queries support lookup by category, tag, shape, and free-text
//! scoring.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{ParamType, ToolDescriptor};

/// Closed category set for tool classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Mathematics,
    Statistics,
    LinearAlgebra,
    Calculus,
    NumberTheory,
    DataProcessing,
    FileOps,
    Network,
    Database,
    AiMl,
    Utilities,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mathematics => "mathematics",
            Category::Statistics => "statistics",
            Category::LinearAlgebra => "linear-algebra",
            Category::Calculus => "calculus",
            Category::NumberTheory => "number-theory",
            Category::DataProcessing => "data-processing",
            Category::FileOps => "file-ops",
            Category::Network => "network",
            Category::Database => "database",
            Category::AiMl => "ai-ml",
            Category::Utilities => "utilities",
        }
    }

    /// Parse a category label, falling back to `Utilities` for anything
    /// outside the closed set.
    pub fn parse(label: &str) -> Self {
        match label {
            "mathematics" | "math" => Category::Mathematics,
            "statistics" => Category::Statistics,
            "linear-algebra" | "linear_algebra" => Category::LinearAlgebra,
            "calculus" => Category::Calculus,
            "number-theory" | "number_theory" => Category::NumberTheory,
            "data-processing" | "data_processing" => Category::DataProcessing,
            "file-ops" | "file_ops" | "filesystem" => Category::FileOps,
            "network" | "web" => Category::Network,
            "database" => Category::Database,
            "ai-ml" | "ai_ml" => Category::AiMl,
            _ => Category::Utilities,
        }
    }
}

/// Inferred difficulty of using a tool correctly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Advanced,
}

/// Keywords that push a tool's inferred complexity up
const ADVANCED_KEYWORDS: &[&str] = &[
    "matrix",
    "eigenvalue",
    "integral",
    "derivative",
    "regression",
    "optimize",
    "optimization",
    "interpolate",
    "differential",
    "decomposition",
];

const MODERATE_KEYWORDS: &[&str] = &[
    "statistics",
    "statistical",
    "search",
    "parse",
    "repository",
    "remote",
    "deviation",
    "distribution",
    "aggregate",
    "pipeline",
];

/// Words too common to be useful as tags
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "over", "per", "each", "given",
    "them", "then", "when", "where", "returns", "return", "value", "values", "uses", "using",
];

/// One tool's entry in the index
#[derive(Debug, Clone, Serialize)]
pub struct ToolCapability {
    pub name: String,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub complexity: Complexity,
    pub inputs: Vec<ParamType>,
    pub output: String,
}

/// Discovery index over registered tools
#[derive(Default)]
pub struct CapabilityIndex {
    entries: RwLock<HashMap<String, ToolCapability>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive an entry from a descriptor and store it.
    pub fn index(&self, descriptor: &ToolDescriptor) {
        let text = format!("{} {}", descriptor.name, descriptor.description).to_lowercase();
        let tags = derive_tags(&descriptor.description);
        let complexity = infer_complexity(&text);
        let capability = ToolCapability {
            name: descriptor.name.clone(),
            category: Category::parse(&descriptor.category),
            tags,
            complexity,
            inputs: descriptor.params.iter().map(|p| p.kind).collect(),
            output: "text".to_string(),
        };
        self.entries
            .write()
            .insert(descriptor.name.clone(), capability);
    }

    pub fn remove(&self, name: &str) {
        self.entries.write().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<ToolCapability> {
        self.entries.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every tool in a category, sorted by name.
    pub fn by_category(&self, category: Category) -> Vec<ToolCapability> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|c| c.category == category)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Every tool carrying all of the given tags.
    pub fn by_tags(&self, tags: &[&str]) -> Vec<ToolCapability> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|c| tags.iter().all(|t| c.tags.contains(*t)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Every tool accepting the given input type and producing the output.
    pub fn by_shape(&self, input: ParamType, output: &str) -> Vec<ToolCapability> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|c| c.inputs.contains(&input) && c.output == output)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Free-text discovery: word overlap plus a substring bonus, scores
    /// sorted descending. Zero-score tools are dropped.
    pub fn score(&self, query: &str) -> Vec<(String, f64)> {
        let query_lower = query.to_lowercase();
        let query_words: BTreeSet<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .collect();

        let mut scored: Vec<(String, f64)> = self
            .entries
            .read()
            .values()
            .filter_map(|c| {
                let mut score = 0.0;
                for word in &query_words {
                    if c.tags.contains(*word) {
                        score += 1.0;
                    }
                    if c.name.contains(*word) {
                        score += 2.0;
                    }
                }
                if !query_words.is_empty() && query_lower.contains(c.name.split('_').next_back()?) {
                    score += 1.5;
                }
                if score > 0.0 {
                    Some((c.name.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

fn derive_tags(description: &str) -> BTreeSet<String> {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn infer_complexity(text: &str) -> Complexity {
    if ADVANCED_KEYWORDS.iter().any(|k| text.contains(k)) {
        Complexity::Advanced
    } else if MODERATE_KEYWORDS.iter().any(|k| text.contains(k)) {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, description: &str, category: &str) -> ToolDescriptor {
        ToolDescriptor::new("calc", name, description)
            .with_category(category)
            .with_param("expression", ParamType::String, "Expression text", true)
    }

    #[test]
    fn category_parse_closed_set() {
        assert_eq!(Category::parse("mathematics"), Category::Mathematics);
        assert_eq!(Category::parse("file-ops"), Category::FileOps);
        assert_eq!(Category::parse("made-up"), Category::Utilities);
    }

    #[test]
    fn complexity_inference() {
        let index = CapabilityIndex::new();
        index.index(&descriptor(
            "integrate",
            "Compute the definite integral of a function",
            "calculus",
        ));
        index.index(&descriptor("add", "Add two numbers", "mathematics"));

        assert_eq!(
            index.get("calc_integrate").unwrap().complexity,
            Complexity::Advanced
        );
        assert_eq!(index.get("calc_add").unwrap().complexity, Complexity::Simple);
    }

    #[test]
    fn tag_and_category_discovery() {
        let index = CapabilityIndex::new();
        index.index(&descriptor(
            "mean",
            "Arithmetic mean of a list of numbers",
            "statistics",
        ));
        index.index(&descriptor("add", "Add two numbers", "mathematics"));

        assert_eq!(index.by_category(Category::Statistics).len(), 1);
        assert_eq!(index.by_tags(&["numbers"]).len(), 2);
        assert_eq!(index.by_tags(&["numbers", "mean"]).len(), 1);
    }

    #[test]
    fn scoring_sorts_descending() {
        let index = CapabilityIndex::new();
        index.index(&descriptor(
            "mean",
            "Arithmetic mean average of numbers",
            "statistics",
        ));
        index.index(&descriptor("add", "Add two numbers", "mathematics"));

        let scored = index.score("compute the mean average");
        assert_eq!(scored[0].0, "calc_mean");
        assert!(scored[0].1 > scored.last().unwrap().1 || scored.len() == 1);
    }
}
