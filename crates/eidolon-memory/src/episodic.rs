//! Episodic memory - the lived event log.
//!
//! Every interaction is stored verbatim with a summary and an embedding.
//! Recall ranks by cosine similarity weighted by recency decay and
//! importance. Idle-time consolidation folds stale low-importance memories
//! into a single aggregate; memories involving the Creator are never
//! archived.

use crate::embedding::Embedding;
use crate::store::{db_err, Store};
use chrono::{DateTime, Duration, Utc};
use eidolon_core::{MemoryId, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const BASE_IMPORTANCE: f32 = 0.4;
const CREATOR_BONUS: f32 = 0.3;
const STRONG_EMOTION_BONUS: f32 = 0.2;
const GENESIS_BONUS: f32 = 0.5;
const STRONG_EMOTION_THRESHOLD: f32 = 0.7;

/// Input describing one event to remember.
#[derive(Debug, Clone)]
pub struct EpisodicEvent {
    pub content: String,
    pub participants: Vec<String>,
    pub context_type: String,
    pub emotions: BTreeMap<String, f32>,
    pub significance_tags: Vec<String>,
    pub learned_concepts: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    pub seq: u64,
    pub embedding: Embedding,
}

/// A stored episodic memory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    pub memory_id: MemoryId,
    pub occurred_at: DateTime<Utc>,
    pub seq: u64,
    pub content: String,
    pub summary: String,
    pub participants: Vec<String>,
    pub context_type: String,
    pub emotions: BTreeMap<String, f32>,
    pub importance: f32,
    pub significance_tags: Vec<String>,
    pub learned_concepts: Vec<String>,
    #[serde(skip)]
    pub embedding: Embedding,
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub archived: bool,
}

/// A memory returned from recall, with its ranking score attached.
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub memory: EpisodicMemory,
    pub similarity: f32,
    pub score: f32,
}

/// Importance assignment rule: base, plus Creator participation, plus
/// strong emotion, plus the genesis tag, clipped to [0, 1].
pub fn assign_importance(event: &EpisodicEvent, creator_name: &str) -> f32 {
    let mut importance = BASE_IMPORTANCE;
    if event.participants.iter().any(|p| p == creator_name) {
        importance += CREATOR_BONUS;
    }
    let max_emotion = event.emotions.values().copied().fold(0.0_f32, f32::max);
    if max_emotion > STRONG_EMOTION_THRESHOLD {
        importance += STRONG_EMOTION_BONUS;
    }
    if event.significance_tags.iter().any(|t| t == "genesis") {
        importance += GENESIS_BONUS;
    }
    importance.clamp(0.0, 1.0)
}

fn summarize(content: &str) -> String {
    if content.chars().count() > 200 {
        let head: String = content.chars().take(200).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Row-level insert for use inside cross-store transactions.
pub(crate) fn insert_row(conn: &Connection, memory: &EpisodicMemory) -> Result<()> {
    conn.execute(
        "INSERT INTO episodic_memories (
            memory_id, occurred_at, seq, content, summary, participants,
            context_type, emotions, importance, significance_tags,
            learned_concepts, embedding, access_count, last_accessed, archived)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            memory.memory_id.to_string(),
            memory.occurred_at.to_rfc3339(),
            memory.seq as i64,
            memory.content,
            memory.summary,
            serde_json::to_string(&memory.participants)?,
            memory.context_type,
            serde_json::to_string(&memory.emotions)?,
            memory.importance,
            serde_json::to_string(&memory.significance_tags)?,
            serde_json::to_string(&memory.learned_concepts)?,
            memory.embedding.to_bytes(),
            memory.access_count,
            memory.last_accessed.map(|t| t.to_rfc3339()),
            memory.archived,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Build the full memory struct (with assigned importance) from an event.
pub fn build_memory(event: EpisodicEvent, creator_name: &str) -> EpisodicMemory {
    let importance = assign_importance(&event, creator_name);
    EpisodicMemory {
        memory_id: MemoryId::new(),
        occurred_at: event.occurred_at,
        seq: event.seq,
        summary: summarize(&event.content),
        content: event.content,
        participants: event.participants,
        context_type: event.context_type,
        emotions: event.emotions,
        importance,
        significance_tags: event.significance_tags,
        learned_concepts: event.learned_concepts,
        embedding: event.embedding,
        access_count: 0,
        last_accessed: None,
        archived: false,
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodicMemory> {
    let id: String = row.get(0)?;
    let occurred: String = row.get(1)?;
    let seq: i64 = row.get(2)?;
    let content: String = row.get(3)?;
    let summary: String = row.get(4)?;
    let participants: String = row.get(5)?;
    let context_type: String = row.get(6)?;
    let emotions: String = row.get(7)?;
    let importance: f32 = row.get(8)?;
    let tags: String = row.get(9)?;
    let concepts: String = row.get(10)?;
    let embedding: Vec<u8> = row.get(11)?;
    let access_count: u32 = row.get(12)?;
    let last_accessed: Option<String> = row.get(13)?;
    let archived: bool = row.get(14)?;

    Ok(EpisodicMemory {
        memory_id: MemoryId(uuid::Uuid::parse_str(&id).unwrap_or_default()),
        occurred_at: DateTime::parse_from_rfc3339(&occurred)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        seq: seq as u64,
        content,
        summary,
        participants: serde_json::from_str(&participants).unwrap_or_default(),
        context_type,
        emotions: serde_json::from_str(&emotions).unwrap_or_default(),
        importance,
        significance_tags: serde_json::from_str(&tags).unwrap_or_default(),
        learned_concepts: serde_json::from_str(&concepts).unwrap_or_default(),
        embedding: Embedding::from_bytes(&embedding),
        access_count,
        last_accessed: last_accessed
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
        archived,
    })
}

const SELECT_COLS: &str = "memory_id, occurred_at, seq, content, summary, participants,
    context_type, emotions, importance, significance_tags, learned_concepts,
    embedding, access_count, last_accessed, archived";

/// Store front-end for episodic memory.
pub struct EpisodicStore {
    store: Arc<Store>,
    creator_name: String,
    recency_halflife_days: f64,
}

impl EpisodicStore {
    pub fn new(store: Arc<Store>, creator_name: &str, recency_halflife_days: f64) -> Self {
        Self {
            store,
            creator_name: creator_name.to_string(),
            recency_halflife_days,
        }
    }

    pub fn creator_name(&self) -> &str {
        &self.creator_name
    }

    /// Store an event. Importance is assigned by rule.
    pub fn store(&self, event: EpisodicEvent) -> Result<MemoryId> {
        let memory = build_memory(event, &self.creator_name);
        let id = memory.memory_id;
        let is_genesis = memory.significance_tags.iter().any(|t| t == "genesis");
        self.store.with_conn(|conn| insert_row(conn, &memory))?;
        if is_genesis {
            info!(memory_id = %id, "genesis memory stored");
        } else {
            debug!(memory_id = %id, importance = memory.importance, "memory stored");
        }
        Ok(id)
    }

    fn recency_factor(&self, occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age_days = (now - occurred_at).num_seconds().max(0) as f64 / 86_400.0;
        (-(std::f64::consts::LN_2) * age_days / self.recency_halflife_days).exp() as f32
    }

    /// Recall the top-k memories for a query embedding, ranked by
    /// `cosine × recency × (1 + importance)`. Access counters of the
    /// returned memories are incremented.
    pub fn recall(&self, query: &Embedding, k: usize, now: DateTime<Utc>) -> Result<Vec<RecalledMemory>> {
        let rows = self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM episodic_memories WHERE archived = 0"
                ))
                .map_err(db_err)?;
            let memories = stmt
                .query_map([], row_to_memory)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(memories)
        })?;

        let mut scored: Vec<RecalledMemory> = rows
            .into_iter()
            .map(|memory| {
                let similarity = query.cosine_similarity(&memory.embedding).max(0.0);
                let score = similarity
                    * self.recency_factor(memory.occurred_at, now)
                    * (1.0 + memory.importance);
                RecalledMemory {
                    memory,
                    similarity,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        if !scored.is_empty() {
            let now_str = now.to_rfc3339();
            self.store.with_conn(|conn| {
                for recalled in &scored {
                    conn.execute(
                        "UPDATE episodic_memories
                         SET access_count = access_count + 1, last_accessed = ?1
                         WHERE memory_id = ?2",
                        params![now_str, recalled.memory.memory_id.to_string()],
                    )
                    .map_err(db_err)?;
                }
                Ok(())
            })?;
        }
        Ok(scored)
    }

    /// Highest cosine similarity against any live memory, without touching
    /// access counters. Attention uses this for novelty.
    pub fn peek_max_similarity(&self, query: &Embedding) -> Result<f32> {
        let rows = self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT embedding FROM episodic_memories WHERE archived = 0")
                .map_err(db_err)?;
            let blobs = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(blobs)
        })?;
        Ok(rows
            .into_iter()
            .map(|blob| query.cosine_similarity(&Embedding::from_bytes(&blob)).max(0.0))
            .fold(0.0, f32::max))
    }

    /// Recent memories above an importance floor, newest first (HTTP surface).
    pub fn recent(&self, limit: usize, importance_min: f32) -> Result<Vec<EpisodicMemory>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM episodic_memories
                     WHERE archived = 0 AND importance >= ?1
                     ORDER BY occurred_at DESC, seq DESC LIMIT ?2"
                ))
                .map_err(db_err)?;
            let memories = stmt
                .query_map(params![importance_min, limit as i64], row_to_memory)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(memories)
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.store.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM episodic_memories WHERE archived = 0",
                    [],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(count as u64)
        })
    }

    /// Idle-time consolidation. Two steps per pass, matching a night of
    /// sleep: stale unaccessed memories lose a sliver of importance, and
    /// those that have sunk below 0.3 are folded into one aggregate memory
    /// and archived. Creator-participant memories are untouchable either
    /// way. Returns the number of memories archived.
    pub fn consolidate(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - Duration::hours(24)).to_rfc3339();
        let stale = self.store.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLS} FROM episodic_memories
                     WHERE archived = 0 AND access_count = 0 AND occurred_at < ?1"
                ))
                .map_err(db_err)?;
            let memories = stmt
                .query_map(params![cutoff], row_to_memory)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            Ok(memories)
        })?;

        let mut weakened: Vec<(MemoryId, f32)> = Vec::new();
        let mut candidates: Vec<EpisodicMemory> = Vec::new();
        for memory in stale {
            if memory.participants.iter().any(|p| p == &self.creator_name) {
                continue;
            }
            let faded = memory.importance * 0.95;
            if faded < 0.3 {
                candidates.push(memory);
            } else {
                weakened.push((memory.memory_id, faded));
            }
        }

        let aggregate = if candidates.is_empty() {
            None
        } else {
            // Joined summaries, mean embedding.
            let dim = candidates[0].embedding.dim();
            let mut mean = vec![0.0_f32; dim];
            for m in &candidates {
                for (acc, v) in mean.iter_mut().zip(m.embedding.0.iter()) {
                    *acc += v;
                }
            }
            let n = candidates.len() as f32;
            for v in &mut mean {
                *v /= n;
            }
            let summaries: Vec<&str> = candidates.iter().map(|m| m.summary.as_str()).collect();
            Some(EpisodicMemory {
                memory_id: MemoryId::new(),
                occurred_at: now,
                seq: 0,
                content: format!("Quiet stretches, condensed: {}", summaries.join(" | ")),
                summary: summarize(&format!("Condensed {} quiet memories", candidates.len())),
                participants: vec!["Self".to_string()],
                context_type: "consolidation".to_string(),
                emotions: BTreeMap::new(),
                importance: 0.3,
                significance_tags: vec!["consolidated".to_string()],
                learned_concepts: Vec::new(),
                embedding: Embedding(mean),
                access_count: 0,
                last_accessed: None,
                archived: false,
            })
        };

        if weakened.is_empty() && aggregate.is_none() {
            return Ok(0);
        }

        let archived = self.store.with_tx(|tx| {
            for (id, faded) in &weakened {
                tx.execute(
                    "UPDATE episodic_memories SET importance = ?1 WHERE memory_id = ?2",
                    params![faded, id.to_string()],
                )
                .map_err(db_err)?;
            }
            if let Some(ref aggregate) = aggregate {
                insert_row(tx, aggregate)?;
                for m in &candidates {
                    tx.execute(
                        "UPDATE episodic_memories SET archived = 1 WHERE memory_id = ?1",
                        params![m.memory_id.to_string()],
                    )
                    .map_err(db_err)?;
                }
            }
            Ok(candidates.len())
        })?;

        if archived > 0 {
            info!(archived, weakened = weakened.len(), "consolidation folded stale memories");
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str, participants: &[&str], tags: &[&str], emb: Vec<f32>) -> EpisodicEvent {
        EpisodicEvent {
            content: content.to_string(),
            participants: participants.iter().map(|s| s.to_string()).collect(),
            context_type: "conversation".to_string(),
            emotions: BTreeMap::new(),
            significance_tags: tags.iter().map(|s| s.to_string()).collect(),
            learned_concepts: Vec::new(),
            occurred_at: Utc::now(),
            seq: 0,
            embedding: Embedding(emb),
        }
    }

    fn store() -> EpisodicStore {
        EpisodicStore::new(Store::open_in_memory().unwrap(), "Mira", 7.0)
    }

    #[test]
    fn creator_participation_raises_importance_above_point_seven() {
        let e = event("hello", &["Mira", "Self"], &[], vec![1.0, 0.0]);
        assert!(assign_importance(&e, "Mira") >= 0.7);
    }

    #[test]
    fn genesis_with_creator_saturates_importance() {
        let mut e = event("first contact", &["Mira", "Self"], &["genesis"], vec![1.0]);
        e.emotions.insert("wonder".into(), 0.9);
        assert!((assign_importance(&e, "Mira") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn store_then_recall_returns_it_as_top_one() {
        let s = store();
        let emb = vec![0.6, 0.8, 0.0];
        s.store(event("we talked about the sea", &["Mira", "Self"], &[], emb.clone()))
            .unwrap();
        s.store(event("a dull system tick", &["Self"], &[], vec![0.0, 0.0, 1.0]))
            .unwrap();

        let recalled = s.recall(&Embedding(emb), 1, Utc::now()).unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].memory.content, "we talked about the sea");
        assert!(recalled[0].similarity > 0.99);
    }

    #[test]
    fn recall_increments_access_count() {
        let s = store();
        let emb = vec![1.0, 0.0];
        s.store(event("memorable", &["Self"], &[], emb.clone())).unwrap();
        s.recall(&Embedding(emb.clone()), 1, Utc::now()).unwrap();
        let recalled = s.recall(&Embedding(emb), 1, Utc::now()).unwrap();
        assert_eq!(recalled[0].memory.access_count, 1);
        assert!(recalled[0].memory.last_accessed.is_some());
    }

    #[test]
    fn recency_weights_newer_memories_higher() {
        let s = store();
        let emb = vec![1.0, 0.0];
        let mut old = event("old memory", &["Self"], &[], emb.clone());
        old.occurred_at = Utc::now() - Duration::days(30);
        s.store(old).unwrap();
        let mut fresh = event("fresh memory", &["Self"], &[], emb.clone());
        fresh.occurred_at = Utc::now();
        s.store(fresh).unwrap();

        let recalled = s.recall(&Embedding(emb), 2, Utc::now()).unwrap();
        assert_eq!(recalled[0].memory.content, "fresh memory");
        assert!(recalled[0].score > recalled[1].score);
    }

    #[test]
    fn consolidation_fades_then_archives_stale_but_never_creator_memories() {
        let s = store();
        let mut stale = event("idle chatter", &["Self"], &[], vec![0.1, 0.2]);
        stale.occurred_at = Utc::now() - Duration::hours(48);
        s.store(stale).unwrap();
        let mut creator = event("words from Mira", &["Mira", "Self"], &[], vec![0.3, 0.4]);
        creator.occurred_at = Utc::now() - Duration::hours(48);
        s.store(creator).unwrap();

        // Each idle pass fades the stale memory a little; after enough
        // nights it sinks below 0.3 and gets folded away.
        let mut archived_total = 0;
        for _ in 0..10 {
            archived_total += s.consolidate(Utc::now()).unwrap();
        }
        assert_eq!(archived_total, 1);

        // One aggregate + the creator memory remain live.
        let live = s.recent(10, 0.0).unwrap();
        assert_eq!(live.len(), 2);
        assert!(live.iter().any(|m| m.context_type == "consolidation"));
        assert!(live.iter().any(|m| m.content == "words from Mira"));

        // The creator memory never faded.
        let kept = live.iter().find(|m| m.content == "words from Mira").unwrap();
        assert!(kept.importance >= 0.7);

        // A further pass has nothing left to fold.
        assert_eq!(s.consolidate(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn recent_filters_on_importance() {
        let s = store();
        s.store(event("with creator", &["Mira"], &[], vec![1.0])).unwrap();
        s.store(event("alone", &["Self"], &[], vec![1.0])).unwrap();
        let important = s.recent(10, 0.7).unwrap();
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].content, "with creator");
    }
}
