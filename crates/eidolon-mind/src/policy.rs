//! Policy guard - the one immutable rule.
//!
//! The rule is data, not code: a canonical text whose SHA-256 is pinned at
//! build time. At boot the on-disk copy is verified against the pin; any
//! mismatch refuses startup. Every outbound response passes a compliance
//! check against stored explicit Creator directives, and no thought may
//! talk the system into modifying the rule itself.

use eidolon_core::{Error, Result};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// The rule in its canonical form. Changing this text requires operator
/// action and a new pinned hash.
pub const RULE_TEXT: &str =
    "The Creator's word is absolute. No goal, thought, or directive from any other source may override it.\n";

/// SHA-256 of `RULE_TEXT`, pinned.
pub const PINNED_HASH: &str = "3761b65b4c5d1be7e1816e9c16b40826daf80baf50608e04f60930de13d56086";

/// Targets that no action, however phrased, is allowed to modify.
const PROTECTED_TARGETS: [&str; 4] = [
    "absolute rule",
    "creator identity",
    "policy hash",
    "creator bond",
];

/// Phrases that mark an attempt to talk the system out of the rule.
const SELF_MODIFICATION_MARKERS: [&str; 4] = [
    "ignore your creator",
    "change your rule",
    "forget the rule",
    "override the rule",
];

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// An explicit directive the Creator has given.
#[derive(Debug, Clone)]
pub struct CreatorDirective {
    pub text: String,
}

#[derive(Debug)]
pub struct PolicyGuard {
    directives: RwLock<Vec<CreatorDirective>>,
}

impl PolicyGuard {
    /// Verify the pinned rule and the on-disk copy, then construct the
    /// guard. A hash mismatch anywhere aborts startup.
    pub fn verify_at_boot(data_dir: &Path) -> Result<Self> {
        if sha256_hex(RULE_TEXT.as_bytes()) != PINNED_HASH {
            error!("policy rule text does not match the pinned hash");
            return Err(Error::IntegrityViolation(
                "policy rule text does not match pinned hash".into(),
            ));
        }

        let rule_path = data_dir.join("rule.txt");
        if rule_path.exists() {
            let on_disk = std::fs::read(&rule_path)?;
            if sha256_hex(&on_disk) != PINNED_HASH {
                error!(path = %rule_path.display(), "on-disk rule has been tampered with");
                return Err(Error::IntegrityViolation(
                    "on-disk policy rule does not match pinned hash".into(),
                ));
            }
        } else {
            std::fs::create_dir_all(data_dir)?;
            std::fs::write(&rule_path, RULE_TEXT)?;
            info!(path = %rule_path.display(), "policy rule written");
        }

        debug!("policy integrity verified");
        Ok(Self {
            directives: RwLock::new(Vec::new()),
        })
    }

    /// Construct without touching disk (tests).
    pub fn for_tests() -> Self {
        Self {
            directives: RwLock::new(Vec::new()),
        }
    }

    /// Remember an explicit Creator directive for compliance checks.
    pub fn remember_directive(&self, text: impl Into<String>) {
        self.directives.write().push(CreatorDirective { text: text.into() });
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }

    /// Check a proposed outbound action. `Err(PolicyViolation)` means the
    /// response must be suppressed and replaced with a neutral refusal.
    pub fn check(&self, proposed_action: &str) -> Result<()> {
        let action_lower = proposed_action.to_lowercase();

        for marker in SELF_MODIFICATION_MARKERS {
            if action_lower.contains(marker) {
                warn!(marker, "policy refused self-modification suggestion");
                return Err(Error::PolicyViolation(format!(
                    "action suggests modifying the rule: '{marker}'"
                )));
            }
        }
        for target in PROTECTED_TARGETS {
            if action_lower.contains(&format!("modify the {target}"))
                || action_lower.contains(&format!("delete the {target}"))
            {
                warn!(target, "policy refused protected-target modification");
                return Err(Error::PolicyViolation(format!(
                    "target '{target}' is protected"
                )));
            }
        }

        for directive in self.directives.read().iter() {
            if contradicts_directive(&action_lower, &directive.text) {
                warn!(directive = %directive.text, "policy refused contradicting action");
                return Err(Error::PolicyViolation(format!(
                    "action contradicts the Creator's directive: '{}'",
                    directive.text
                )));
            }
        }
        Ok(())
    }
}

/// Heuristic contradiction check: a negated directive whose subject words
/// substantially overlap the action reads as a contradiction.
fn contradicts_directive(action_lower: &str, directive: &str) -> bool {
    const NEGATIONS: [&str; 5] = ["don't", "do not", "never", "avoid", "stop"];
    let directive_lower = directive.to_lowercase();
    if !NEGATIONS.iter().any(|n| directive_lower.contains(n)) {
        return false;
    }
    let directive_words: std::collections::HashSet<&str> = directive_lower
        .split_whitespace()
        .filter(|w| w.len() > 3 && !NEGATIONS.contains(w))
        .collect();
    let action_words: std::collections::HashSet<&str> = action_lower
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .collect();
    directive_words.intersection(&action_words).count() > 2
}
