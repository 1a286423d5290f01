//! Intent classification and query decomposition.
//!
//! One minimal backend call turns a reader directive into a
//! `RetrievalQuery`. Pronouns are resolved against the roster before the
//! call so sub-queries carry names the vector index can actually match.
//! Any malformed output degrades to a "direct" classification.

use std::sync::Arc;
use std::time::Duration;

use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};

use crate::assembly::Message;
use crate::backend::GenerationBackend;
use crate::models::Character;
use crate::parse::ParserChain;

/// Similarity floor for treating a directive word as a roster name.
const NAME_MATCH_THRESHOLD: f64 = 0.85;

/// Coarse classification of a directive's need for historical retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Self-contained; no retrieval.
    Direct,
    /// References past events; retrieval needed.
    Recall,
    /// Reacting to the present scene; no retrieval. Behaviorally identical
    /// to Direct, kept distinct for diagnostics.
    React,
}

impl Intent {
    pub fn needs_retrieval(&self) -> bool {
        matches!(self, Intent::Recall)
    }
}

/// Chronological preference expressed by the directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporal {
    Earliest,
    Latest,
    #[default]
    Any,
}

/// Decomposed retrieval query, produced once per operation and cached on
/// the context for sibling reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub intent: Intent,
    pub temporal: Temporal,
    /// Focused sub-queries, at most the configured cap.
    pub sub_queries: Vec<String>,
    /// Keyword synonym expansions for coverage checks.
    pub keywords: Vec<String>,
}

impl RetrievalQuery {
    /// The empty result every failure path degrades to.
    pub fn direct() -> Self {
        Self {
            intent: Intent::Direct,
            temporal: Temporal::Any,
            sub_queries: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

/// Replace pronouns in a directive with roster names, gender-aware where
/// inferable. The most recently mentioned matching character wins; a
/// pronoun with no antecedent is left alone. Resolution failures degrade
/// retrieval quality silently, they never error.
pub fn resolve_pronouns(directive: &str, roster: &[Character]) -> String {
    if roster.is_empty() {
        return directive.to_string();
    }

    let mut mentioned: Vec<usize> = Vec::new();
    let mut out: Vec<String> = Vec::new();

    for raw_word in directive.split_whitespace() {
        let word: String = raw_word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'')
            .collect();
        let bare = word.trim_end_matches("'s");

        if let Some(idx) = match_roster_name(bare, roster) {
            mentioned.retain(|m| *m != idx);
            mentioned.push(idx);
            out.push(raw_word.to_string());
            continue;
        }

        let lower = bare.to_lowercase();
        if is_pronoun(&lower) {
            let antecedent = mentioned
                .iter()
                .rev()
                .find(|idx| roster[**idx].answers_to_pronoun(&lower));
            if let Some(&idx) = antecedent {
                let name = &roster[idx].name;
                let replacement = if is_possessive(&lower) {
                    format!("{}'s", name)
                } else {
                    name.clone()
                };
                out.push(raw_word.replacen(&word, &replacement, 1));
                continue;
            }
        }

        out.push(raw_word.to_string());
    }

    out.join(" ")
}

fn match_roster_name(word: &str, roster: &[Character]) -> Option<usize> {
    if word.is_empty() || !word.chars().next().is_some_and(|c| c.is_uppercase()) {
        return None;
    }
    let word_lower = word.to_lowercase();
    roster.iter().position(|character| {
        character.matches_name(word)
            || levenshtein::normalized_similarity(
                word_lower.chars(),
                character.name.to_lowercase().chars(),
            ) >= NAME_MATCH_THRESHOLD
    })
}

fn is_pronoun(word: &str) -> bool {
    matches!(
        word,
        "he" | "him" | "his" | "she" | "her" | "hers" | "they" | "them" | "their" | "theirs"
    )
}

fn is_possessive(word: &str) -> bool {
    matches!(word, "his" | "her" | "hers" | "their" | "theirs")
}

/// Classifies directives and decomposes "recall" directives into
/// sub-queries via one minimal backend call.
pub struct IntentClassifier {
    backend: Arc<dyn GenerationBackend>,
    chain: ParserChain,
    max_sub_queries: usize,
    max_tokens: usize,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        max_sub_queries: usize,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            chain: ParserChain::standard(),
            max_sub_queries,
            max_tokens,
            timeout,
        }
    }

    /// Classify and decompose a directive. Never fails: timeouts, backend
    /// errors and undecodable output all degrade to `RetrievalQuery::direct`.
    pub async fn decompose(&self, directive: &str, roster: &[Character]) -> RetrievalQuery {
        let resolved = resolve_pronouns(directive, roster);
        let messages = self.classification_messages(&resolved, roster);

        let response = match tokio::time::timeout(
            self.timeout,
            self.backend.complete(&messages, self.max_tokens),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!("Intent classification failed: {}. Treating as direct.", e);
                return RetrievalQuery::direct();
            }
            Err(_) => {
                tracing::warn!("Intent classification timed out. Treating as direct.");
                return RetrievalQuery::direct();
            }
        };

        self.decode(&response, &resolved)
    }

    fn classification_messages(&self, directive: &str, roster: &[Character]) -> Vec<Message> {
        let names: Vec<&str> = roster.iter().map(|c| c.name.as_str()).collect();
        let system = format!(
            "You classify reader directives for an interactive story engine.\n\
             Characters: {}.\n\
             Answer with a single JSON object and nothing else:\n\
             {{\"intent\": \"direct\" | \"react\" | \"recall\",\n\
              \"temporal\": \"earliest\" | \"latest\" | \"any\",\n\
              \"sub_queries\": [..], \"keywords\": [..]}}\n\
             \"recall\" means the directive references past story events.\n\
             For recall, split compound directives into at most {} focused\n\
             sub-queries and list keyword synonyms.",
            if names.is_empty() {
                "none listed".to_string()
            } else {
                names.join(", ")
            },
            self.max_sub_queries,
        );
        vec![
            Message::system(system),
            Message::user(format!("Directive: {}", directive)),
        ]
    }

    fn decode(&self, response: &str, resolved_directive: &str) -> RetrievalQuery {
        let Some((value, _)) = self.chain.parse(response) else {
            tracing::warn!("Undecodable classification output. Treating as direct.");
            return RetrievalQuery::direct();
        };

        let intent = match value.get("intent").and_then(|v| v.as_str()) {
            Some("recall") => Intent::Recall,
            Some("react") => Intent::React,
            Some("direct") => Intent::Direct,
            other => {
                tracing::warn!(?other, "Unknown intent. Treating as direct.");
                return RetrievalQuery::direct();
            }
        };

        let temporal = match value.get("temporal").and_then(|v| v.as_str()) {
            Some("earliest") => Temporal::Earliest,
            Some("latest") => Temporal::Latest,
            _ => Temporal::Any,
        };

        let mut sub_queries = string_array(&value, "sub_queries");
        sub_queries.truncate(self.max_sub_queries);
        if intent.needs_retrieval() && sub_queries.is_empty() {
            // A recall with no decomposition still searches the directive.
            sub_queries.push(resolved_directive.to_string());
        }

        RetrievalQuery {
            intent,
            temporal,
            sub_queries,
            keywords: string_array(&value, "keywords"),
        }
    }
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::models::Gender;

    fn roster() -> Vec<Character> {
        vec![
            Character {
                id: "character:aria".into(),
                name: "Aria".into(),
                aliases: vec![],
                gender: Gender::Female,
                summary: None,
                voice: None,
                profile: Default::default(),
            },
            Character {
                id: "character:brin".into(),
                name: "Brin".into(),
                aliases: vec![],
                gender: Gender::Male,
                summary: None,
                voice: None,
                profile: Default::default(),
            },
        ]
    }

    #[test]
    fn test_pronoun_resolves_to_matching_gender() {
        let resolved = resolve_pronouns("Aria met Brin and she left", &roster());
        assert_eq!(resolved, "Aria met Brin and Aria left");
    }

    #[test]
    fn test_possessive_pronoun_keeps_apostrophe() {
        let resolved = resolve_pronouns("Brin dropped his sword", &roster());
        assert_eq!(resolved, "Brin dropped Brin's sword");
    }

    #[test]
    fn test_pronoun_without_antecedent_is_left_alone() {
        let resolved = resolve_pronouns("she walked away", &roster());
        assert_eq!(resolved, "she walked away");
    }

    #[test]
    fn test_most_recent_mention_wins() {
        let resolved = resolve_pronouns("Brin saw Aria before he slept", &roster());
        assert_eq!(resolved, "Brin saw Aria before Brin slept");
    }

    fn classifier(backend: Arc<MockBackend>) -> IntentClassifier {
        IntentClassifier::new(backend, 6, 256, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_recall_classification_decodes() {
        let backend = Arc::new(MockBackend::new());
        backend
            .push_response(
                r#"{"intent": "recall", "temporal": "latest",
                    "sub_queries": ["Aria promise blacksmith"],
                    "keywords": ["promise", "vow", "blacksmith"]}"#,
            )
            .await;

        let query = classifier(backend)
            .decompose("What did Aria promise the blacksmith last week?", &roster())
            .await;

        assert_eq!(query.intent, Intent::Recall);
        assert_eq!(query.temporal, Temporal::Latest);
        assert!(query
            .sub_queries
            .iter()
            .any(|q| q.contains("Aria") && q.contains("blacksmith") && q.contains("promise")));
    }

    #[tokio::test]
    async fn test_direct_classification() {
        let backend = Arc::new(MockBackend::new());
        backend.push_response(r#"{"intent": "direct"}"#).await;

        let query = classifier(backend)
            .decompose("I nod and walk away", &roster())
            .await;
        assert_eq!(query.intent, Intent::Direct);
        assert!(!query.intent.needs_retrieval());
    }

    #[tokio::test]
    async fn test_malformed_output_degrades_to_direct() {
        let backend = Arc::new(MockBackend::new());
        backend.push_response("I cannot classify that, sorry!").await;

        let query = classifier(backend).decompose("whatever", &roster()).await;
        assert_eq!(query, RetrievalQuery::direct());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_direct() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next().await;

        let query = classifier(backend).decompose("whatever", &roster()).await;
        assert_eq!(query, RetrievalQuery::direct());
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_direct() {
        let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(100)));
        backend.push_response(r#"{"intent": "recall"}"#).await;
        let classifier =
            IntentClassifier::new(backend, 6, 256, Duration::from_millis(5));

        let query = classifier.decompose("whatever", &roster()).await;
        assert_eq!(query, RetrievalQuery::direct());
    }

    #[tokio::test]
    async fn test_recall_without_sub_queries_searches_directive() {
        let backend = Arc::new(MockBackend::new());
        backend.push_response(r#"{"intent": "recall"}"#).await;

        let query = classifier(backend)
            .decompose("What happened at the forge?", &roster())
            .await;
        assert_eq!(query.sub_queries, vec!["What happened at the forge?"]);
    }

    #[tokio::test]
    async fn test_sub_queries_capped() {
        let backend = Arc::new(MockBackend::new());
        backend
            .push_response(
                r#"{"intent": "recall", "sub_queries":
                    ["a", "b", "c", "d", "e", "f", "g", "h"]}"#,
            )
            .await;

        let query = classifier(backend).decompose("everything", &roster()).await;
        assert_eq!(query.sub_queries.len(), 6);
    }
}
