//! Semantic memory - concepts, values, and Creator teachings.
//!
//! Creator teachings are privileged: importance is floored at 0.9, the exact
//! words are kept, and no non-Creator source may ever lower their confidence.

use crate::embedding::Embedding;
use crate::store::{db_err, Store};
use chrono::{DateTime, Utc};
use eidolon_core::{ConceptId, Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const CREATOR_TEACHING_IMPORTANCE_FLOOR: f32 = 0.9;
const CREATOR_QUERY_WEIGHT: f32 = 0.8;

/// What kind of knowledge a concept is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticKind {
    Value,
    Fact,
    Skill,
    Relationship,
    Concept,
}

impl SemanticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Fact => "fact",
            Self::Skill => "skill",
            Self::Relationship => "relationship",
            Self::Concept => "concept",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "value" => Self::Value,
            "fact" => Self::Fact,
            "skill" => Self::Skill,
            "relationship" => Self::Relationship,
            _ => Self::Concept,
        }
    }
}

/// Input for `teach`.
#[derive(Debug, Clone)]
pub struct Teaching {
    pub name: String,
    pub kind: SemanticKind,
    pub definition: String,
    pub learned_from: String,
    pub is_creator_teaching: bool,
    /// Required when `is_creator_teaching` is set.
    pub exact_words: Option<String>,
    pub embedding: Embedding,
}

/// A stored concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticItem {
    pub concept_id: ConceptId,
    pub name: String,
    pub kind: SemanticKind,
    pub definition: String,
    pub learned_from: String,
    pub confidence: f32,
    pub is_creator_teaching: bool,
    pub creator_exact_words: Option<String>,
    pub importance: f32,
    pub related_ids: Vec<ConceptId>,
    #[serde(skip)]
    pub embedding: Embedding,
    pub learned_at: DateTime<Utc>,
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<SemanticItem> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let definition: String = row.get(3)?;
    let learned_from: String = row.get(4)?;
    let confidence: f32 = row.get(5)?;
    let is_creator: bool = row.get(6)?;
    let exact_words: Option<String> = row.get(7)?;
    let importance: f32 = row.get(8)?;
    let related: String = row.get(9)?;
    let embedding: Vec<u8> = row.get(10)?;
    let learned_at: String = row.get(11)?;

    Ok(SemanticItem {
        concept_id: ConceptId(uuid::Uuid::parse_str(&id).unwrap_or_default()),
        name,
        kind: SemanticKind::parse(&kind),
        definition,
        learned_from,
        confidence,
        is_creator_teaching: is_creator,
        creator_exact_words: exact_words,
        importance,
        related_ids: serde_json::from_str(&related).unwrap_or_default(),
        embedding: Embedding::from_bytes(&embedding),
        learned_at: DateTime::parse_from_rfc3339(&learned_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLS: &str = "concept_id, name, kind, definition, learned_from, confidence,
    is_creator_teaching, creator_exact_words, importance, related_ids, embedding, learned_at";

pub(crate) fn find_by_name(conn: &Connection, name: &str) -> Result<Option<SemanticItem>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLS} FROM semantic_memory WHERE name = ?1"),
        params![name],
        row_to_item,
    )
    .optional()
    .map_err(db_err)
}

/// Row-level teach, usable inside cross-store transactions. Writes a new
/// concept or merges into an existing one, honoring the Creator-teaching
/// protections.
pub(crate) fn teach_row(conn: &Connection, teaching: &Teaching, now: DateTime<Utc>) -> Result<ConceptId> {
    if teaching.is_creator_teaching && teaching.exact_words.is_none() {
        return Err(Error::InvalidMessage(
            "creator teaching requires the exact words".into(),
        ));
    }

    if let Some(existing) = find_by_name(conn, &teaching.name)? {
        // A non-Creator source may never weaken a Creator teaching.
        if existing.is_creator_teaching && !teaching.is_creator_teaching {
            debug!(name = %teaching.name, "non-creator write against creator teaching ignored");
            return Ok(existing.concept_id);
        }

        let is_creator = existing.is_creator_teaching || teaching.is_creator_teaching;
        let confidence = if teaching.is_creator_teaching {
            // Creator reinforcement: confidence only grows.
            existing.confidence.max(1.0)
        } else {
            (existing.confidence + 0.1).min(1.0)
        };
        let importance = if is_creator {
            existing.importance.max(CREATOR_TEACHING_IMPORTANCE_FLOOR)
        } else {
            existing.importance
        };
        let exact_words = teaching
            .exact_words
            .clone()
            .or(existing.creator_exact_words.clone());

        conn.execute(
            "UPDATE semantic_memory
             SET definition = ?1, learned_from = ?2, confidence = ?3,
                 is_creator_teaching = ?4, creator_exact_words = ?5,
                 importance = ?6, embedding = ?7
             WHERE concept_id = ?8",
            params![
                teaching.definition,
                teaching.learned_from,
                confidence,
                is_creator,
                exact_words,
                importance,
                teaching.embedding.to_bytes(),
                existing.concept_id.to_string(),
            ],
        )
        .map_err(db_err)?;
        return Ok(existing.concept_id);
    }

    let concept_id = ConceptId::new();
    let (confidence, importance) = if teaching.is_creator_teaching {
        (1.0, CREATOR_TEACHING_IMPORTANCE_FLOOR)
    } else {
        (0.5, 0.5)
    };
    conn.execute(
        "INSERT INTO semantic_memory (
            concept_id, name, kind, definition, learned_from, confidence,
            is_creator_teaching, creator_exact_words, importance, related_ids,
            embedding, learned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '[]', ?10, ?11)",
        params![
            concept_id.to_string(),
            teaching.name,
            teaching.kind.as_str(),
            teaching.definition,
            teaching.learned_from,
            confidence,
            teaching.is_creator_teaching,
            teaching.exact_words,
            importance,
            teaching.embedding.to_bytes(),
            now.to_rfc3339(),
        ],
    )
    .map_err(db_err)?;
    Ok(concept_id)
}

/// A queried concept with its weighted score.
#[derive(Debug, Clone)]
pub struct QueriedConcept {
    pub item: SemanticItem,
    pub similarity: f32,
    pub score: f32,
}

/// Store front-end for semantic memory.
pub struct SemanticStore {
    store: Arc<Store>,
}

impl SemanticStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Write or merge a concept. Creator teachings are floored at
    /// importance 0.9 and require the exact words.
    pub fn teach(&self, teaching: Teaching) -> Result<ConceptId> {
        let now = Utc::now();
        let name = teaching.name.clone();
        let is_creator = teaching.is_creator_teaching;
        let id = self.store.with_conn(|conn| teach_row(conn, &teaching, now))?;
        if is_creator {
            info!(concept = %name, "creator teaching stored");
        } else {
            debug!(concept = %name, "concept stored");
        }
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Result<Option<SemanticItem>> {
        self.store.with_conn(|conn| find_by_name(conn, name))
    }

    /// Top-k concepts by `similarity × importance × (1 + 0.8·creator)`.
    pub fn query(&self, query: &Embedding, k: usize) -> Result<Vec<QueriedConcept>> {
        let items = self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLS} FROM semantic_memory"))
                .map_err(db_err)?;
            let items = stmt
                .query_map([], row_to_item)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(items)
        })?;

        let mut scored: Vec<QueriedConcept> = items
            .into_iter()
            .map(|item| {
                let similarity = query.cosine_similarity(&item.embedding).max(0.0);
                let creator_weight = if item.is_creator_teaching {
                    1.0 + CREATOR_QUERY_WEIGHT
                } else {
                    1.0
                };
                let score = similarity * item.importance * creator_weight;
                QueriedConcept {
                    item,
                    similarity,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// All Creator teachings of kind `value`, used to re-arm the policy
    /// guard's directive list at boot.
    pub fn creator_values(&self) -> Result<Vec<SemanticItem>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM semantic_memory
                     WHERE is_creator_teaching = 1 AND kind = 'value'"
                ))
                .map_err(db_err)?;
            let items = stmt
                .query_map([], row_to_item)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(items)
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.store.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM semantic_memory", [], |row| row.get(0))
                .map_err(db_err)?;
            Ok(count as u64)
        })
    }
}
