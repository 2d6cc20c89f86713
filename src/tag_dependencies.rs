//! # Tag Dependencies Module
//!
//! Analisi delle dipendenze tra tag a partire dalle condizioni `req`.
//!
//! ## Responsabilità:
//! - Estrae le variabili (id di tag) da una condizione, es. `participants - girls > 0`
//! - Raccoglie le dipendenze di un tag: prima il `req` del tag, poi quelli dei valori
//! - Ordina i tag in modo che ognuno compaia dopo le sue dipendenze,
//!   spostando il minimo indispensabile rispetto all'ordine di partenza
//! - Rileva i cicli (`a` richiede `b`, `b` richiede `a`)
//!
//! Le dipendenze verso tag sconosciuti sono tollerate: non partecipano
//! all'ordinamento.

use crate::tags::TagDefinition;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::warn;

const KEYWORDS: [&str; 7] = ["and", "or", "not", "true", "false", "null", "undefined"];

struct ConditionPatterns {
    double_quoted: Regex,
    single_quoted: Regex,
    identifier: Regex,
}

fn patterns() -> Option<&'static ConditionPatterns> {
    static PATTERNS: OnceLock<Option<ConditionPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(ConditionPatterns {
                double_quoted: Regex::new(r#""[^"]*""#).ok()?,
                single_quoted: Regex::new(r"'[^']*'").ok()?,
                identifier: Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]*\b").ok()?,
            })
        })
        .as_ref()
}

/// Variable names referenced by a condition, in order of first appearance.
/// String literals and boolean keywords are skipped.
pub fn condition_variables(condition: &str) -> Vec<String> {
    let Some(patterns) = patterns() else {
        return Vec::new();
    };

    let stripped = patterns.double_quoted.replace_all(condition, "");
    let stripped = patterns.single_quoted.replace_all(&stripped, "");

    let mut seen = HashSet::new();
    patterns
        .identifier
        .find_iter(&stripped)
        .map(|m| m.as_str())
        .filter(|name| !KEYWORDS.contains(&name.to_lowercase().as_str()))
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Dependency graph between tag ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDependencies {
    edges: BTreeMap<String, Vec<String>>,
}

impl TagDependencies {
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a TagDefinition>) -> Self {
        let edges = tags
            .into_iter()
            .map(|tag| (tag.id.clone(), tag.dependencies()))
            .collect();
        Self { edges }
    }

    /// Dependencies of `tag_id` (empty for unknown tags)
    pub fn of(&self, tag_id: &str) -> &[String] {
        self.edges.get(tag_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Reorder `order` so every tag follows its dependencies.
    ///
    /// The first tag found ahead of one of its dependencies is moved right
    /// after the last of them, then the scan restarts. Tags already in a
    /// valid position keep their relative order.
    pub fn order(&self, order: &[String]) -> Vec<String> {
        let mut ordered = order.to_vec();
        // Con un ciclo gli spostamenti non convergono
        let max_moves = ordered.len() * ordered.len() + 1;

        for _ in 0..max_moves {
            let misplaced = ordered.iter().enumerate().find_map(|(index, tag)| {
                let latest = self
                    .of(tag)
                    .iter()
                    .filter_map(|dep| ordered.iter().position(|t| t == dep))
                    .max()?;
                (latest > index).then_some((index, latest))
            });

            let Some((index, latest)) = misplaced else {
                return ordered;
            };
            let tag = ordered.remove(index);
            ordered.insert(latest, tag);
        }

        warn!("Tag order did not settle, dependencies are circular");
        ordered
    }

    /// Every dependency cycle, each closed by repeating its first tag
    /// (`["a", "b", "a"]`)
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();

        for tag in self.edges.keys() {
            if !visited.contains(tag.as_str()) {
                let mut path = Vec::new();
                self.visit(tag, &mut path, &mut visited, &mut cycles);
            }
        }
        cycles
    }

    fn visit<'a>(
        &'a self,
        tag: &'a str,
        path: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if let Some(start) = path.iter().position(|t| *t == tag) {
            let mut cycle: Vec<String> = path[start..].iter().map(|t| t.to_string()).collect();
            cycle.push(tag.to_string());
            cycles.push(cycle);
            return;
        }
        if !visited.insert(tag) {
            return;
        }

        path.push(tag);
        for dep in self.of(tag) {
            self.visit(dep, path, visited, cycles);
        }
        path.pop();
    }
}
