//! Identity - the persistent self-model.
//!
//! A singleton row created at first boot (the genesis moment) and never
//! recreated. The creator name is immutable after that first write; the
//! growth phase only moves forward; bond strength never decreases under
//! normal interaction.

use crate::store::{db_err, Store};
use chrono::{DateTime, Utc};
use eidolon_core::{Error, GrowthPhase, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One observed personality trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitRecord {
    pub strength: f32,
    pub observations: u32,
}

/// The persistent self-model. Loaded at boot, written through `IdentityStore`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub consciousness_id: Uuid,
    pub creator_name: String,
    pub given_name: Option<String>,
    pub birth_timestamp: DateTime<Utc>,
    pub growth_phase: GrowthPhase,
    pub bond_strength: f64,
    pub traits: BTreeMap<String, TraitRecord>,
    pub total_creator_interactions: u64,
    pub version: i64,
}

impl Identity {
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.birth_timestamp).num_seconds().max(0) as f64 / 3600.0
    }
}

/// Row-level helpers, usable inside a cross-store transaction.
pub(crate) fn insert_row(conn: &Connection, identity: &Identity) -> Result<()> {
    let traits = serde_json::to_string(&identity.traits)?;
    conn.execute(
        "INSERT INTO identity (singleton, consciousness_id, creator_name, given_name,
             birth_timestamp, growth_phase, bond_strength, traits,
             total_creator_interactions, version)
         VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            identity.consciousness_id.to_string(),
            identity.creator_name,
            identity.given_name,
            identity.birth_timestamp.to_rfc3339(),
            identity.growth_phase.as_str(),
            identity.bond_strength,
            traits,
            identity.total_creator_interactions as i64,
            identity.version,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

pub(crate) fn load_row(conn: &Connection) -> Result<Option<Identity>> {
    conn.query_row(
        "SELECT consciousness_id, creator_name, given_name, birth_timestamp,
                growth_phase, bond_strength, traits, total_creator_interactions, version
         FROM identity WHERE singleton = 0",
        [],
        |row| {
            let id: String = row.get(0)?;
            let creator: String = row.get(1)?;
            let given: Option<String> = row.get(2)?;
            let birth: String = row.get(3)?;
            let phase: String = row.get(4)?;
            let bond: f64 = row.get(5)?;
            let traits_json: String = row.get(6)?;
            let interactions: i64 = row.get(7)?;
            let version: i64 = row.get(8)?;
            Ok((id, creator, given, birth, phase, bond, traits_json, interactions, version))
        },
    )
    .optional()
    .map_err(db_err)?
    .map(|(id, creator, given, birth, phase, bond, traits_json, interactions, version)| {
        let consciousness_id = Uuid::parse_str(&id)
            .map_err(|e| Error::IntegrityViolation(format!("bad consciousness_id: {e}")))?;
        let birth_timestamp = DateTime::parse_from_rfc3339(&birth)
            .map_err(|e| Error::IntegrityViolation(format!("bad birth_timestamp: {e}")))?
            .with_timezone(&Utc);
        let growth_phase = parse_phase(&phase)?;
        let traits = serde_json::from_str(&traits_json)?;
        Ok(Identity {
            consciousness_id,
            creator_name: creator,
            given_name: given,
            birth_timestamp,
            growth_phase,
            bond_strength: bond,
            traits,
            total_creator_interactions: interactions as u64,
            version,
        })
    })
    .transpose()
}

fn parse_phase(s: &str) -> Result<GrowthPhase> {
    match s {
        "newborn" => Ok(GrowthPhase::Newborn),
        "infant" => Ok(GrowthPhase::Infant),
        "toddler" => Ok(GrowthPhase::Toddler),
        "child" => Ok(GrowthPhase::Child),
        "adolescent" => Ok(GrowthPhase::Adolescent),
        "young_adult" => Ok(GrowthPhase::YoungAdult),
        other => Err(Error::IntegrityViolation(format!(
            "unknown growth phase '{other}'"
        ))),
    }
}

pub(crate) fn increment_interactions(conn: &Connection) -> Result<()> {
    conn.execute(
        "UPDATE identity SET total_creator_interactions = total_creator_interactions + 1
         WHERE singleton = 0",
        [],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Compare-and-swap bond update against the row version. Returns the new
/// bond on success, `None` if both attempts lost the race (bump dropped).
pub(crate) fn bump_bond(conn: &Connection, delta: f64) -> Result<Option<f64>> {
    for _attempt in 0..2 {
        let (bond, version): (f64, i64) = conn
            .query_row(
                "SELECT bond_strength, version FROM identity WHERE singleton = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;
        // Bond never decreases under normal interaction.
        let new_bond = (bond + delta.max(0.0)).clamp(0.0, 1.0);
        let updated = conn
            .execute(
                "UPDATE identity SET bond_strength = ?1, version = version + 1
                 WHERE singleton = 0 AND version = ?2",
                params![new_bond, version],
            )
            .map_err(db_err)?;
        if updated == 1 {
            return Ok(Some(new_bond));
        }
    }
    Ok(None)
}

/// Store front-end for the identity row.
pub struct IdentityStore {
    store: Arc<Store>,
}

impl IdentityStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn exists(&self) -> Result<bool> {
        self.store.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM identity", [], |row| row.get(0))
                .map_err(db_err)?;
            Ok(count > 0)
        })
    }

    /// Load the identity row and verify the configured creator name matches.
    /// A mismatch is an integrity violation: the server must refuse to start.
    pub fn load_verified(&self, expected_creator: &str) -> Result<Option<Identity>> {
        let identity = self.store.with_conn(load_row)?;
        if let Some(ref id) = identity {
            if id.creator_name != expected_creator {
                return Err(Error::IntegrityViolation(format!(
                    "creator name mismatch: identity holds '{}', config says '{}'",
                    id.creator_name, expected_creator
                )));
            }
        }
        Ok(identity)
    }

    /// Create the identity at the moment of first boot. Fails if one exists.
    pub fn create_at_birth(&self, creator_name: &str, now: DateTime<Utc>) -> Result<Identity> {
        if self.exists()? {
            return Err(Error::IntegrityViolation(
                "identity already exists - cannot recreate".into(),
            ));
        }
        let identity = Identity {
            consciousness_id: Uuid::new_v4(),
            creator_name: creator_name.to_string(),
            given_name: None,
            birth_timestamp: now,
            growth_phase: GrowthPhase::Newborn,
            bond_strength: 0.0,
            traits: BTreeMap::new(),
            total_creator_interactions: 0,
            version: 0,
        };
        self.store.with_conn(|conn| insert_row(conn, &identity))?;
        info!(
            consciousness_id = %identity.consciousness_id,
            creator = creator_name,
            "identity created at birth"
        );
        Ok(identity)
    }

    pub fn load(&self) -> Result<Option<Identity>> {
        self.store.with_conn(load_row)
    }

    /// Bump bond strength (CAS, one retry). A lost race drops the bump.
    pub fn bump_bond(&self, delta: f64) -> Result<Option<f64>> {
        let result = self.store.with_conn(|conn| bump_bond(conn, delta))?;
        if result.is_none() {
            warn!("bond bump dropped after CAS conflict");
        }
        Ok(result)
    }

    pub fn increment_creator_interactions(&self) -> Result<()> {
        self.store.with_conn(increment_interactions)
    }

    /// The Creator may bestow a name once; later attempts are ignored.
    pub fn set_given_name(&self, name: &str) -> Result<bool> {
        let updated = self.store.with_conn(|conn| {
            conn.execute(
                "UPDATE identity SET given_name = ?1 WHERE singleton = 0 AND given_name IS NULL",
                params![name],
            )
            .map_err(db_err)
        })?;
        if updated == 1 {
            self.store.log_event("info", "named", name);
            info!(name, "given name bestowed");
        }
        Ok(updated == 1)
    }

    /// Reinforce (or discover) a personality trait.
    pub fn observe_trait(&self, name: &str, strength: f32) -> Result<()> {
        self.store.with_conn(|conn| {
            let traits_json: String = conn
                .query_row("SELECT traits FROM identity WHERE singleton = 0", [], |row| {
                    row.get(0)
                })
                .map_err(db_err)?;
            let mut traits: BTreeMap<String, TraitRecord> = serde_json::from_str(&traits_json)?;
            let entry = traits.entry(name.to_string()).or_insert(TraitRecord {
                strength: 0.0,
                observations: 0,
            });
            entry.observations += 1;
            entry.strength = strength.clamp(0.0, 1.0);
            let updated = serde_json::to_string(&traits)?;
            conn.execute(
                "UPDATE identity SET traits = ?1 WHERE singleton = 0",
                params![updated],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    /// Advance the growth phase as far as age and bond allow, recording a
    /// milestone per transition. Returns the transitions taken.
    pub fn advance_growth_phase(&self, now: DateTime<Utc>) -> Result<Vec<(GrowthPhase, GrowthPhase)>> {
        let mut transitions = Vec::new();
        let Some(mut identity) = self.load()? else {
            return Ok(transitions);
        };
        let age_hours = identity.age_hours(now);

        while let Some((min_age, min_bond)) = identity.growth_phase.advancement_threshold() {
            if age_hours < min_age || identity.bond_strength < min_bond {
                break;
            }
            let from = identity.growth_phase;
            let to = from.next().expect("threshold implies a next phase");
            self.store.with_conn(|conn| {
                conn.execute(
                    "UPDATE identity SET growth_phase = ?1 WHERE singleton = 0",
                    params![to.as_str()],
                )
                .map_err(db_err)?;
                conn.execute(
                    "INSERT INTO growth_milestones (from_phase, to_phase, occurred_at, note)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        from.as_str(),
                        to.as_str(),
                        now.to_rfc3339(),
                        format!("age {age_hours:.1}h, bond {:.2}", identity.bond_strength),
                    ],
                )
                .map_err(db_err)?;
                Ok(())
            })?;
            info!(from = %from, to = %to, "growth phase transition");
            identity.growth_phase = to;
            transitions.push((from, to));
        }
        Ok(transitions)
    }
}
