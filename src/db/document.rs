use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{HistoryEntry, MedicationConfig, RuntimeState};

/// Stored form of one medication: configuration and runtime state share a
/// single flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    #[serde(flatten)]
    pub config: MedicationConfig,
    #[serde(flatten)]
    pub state: RuntimeState,
}

impl MedicationRecord {
    pub fn new(config: MedicationConfig) -> Self {
        let state = RuntimeState {
            remaining_amount: config.initial_remaining(),
            ..RuntimeState::default()
        };
        Self { config, state }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Root aggregate: every medication plus the flat history log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedDocument {
    #[serde(default)]
    pub medications: BTreeMap<String, MedicationRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SharedDocument {
    pub fn medication(&self, id: &str) -> Option<&MedicationRecord> {
        self.medications.get(id)
    }

    pub fn medication_mut(&mut self, id: &str) -> Option<&mut MedicationRecord> {
        self.medications.get_mut(id)
    }

    /// Repair a freshly loaded document: ids match their map keys, legacy
    /// units are split, runtime invariants hold. Returns true if anything
    /// changed and the document should be written back.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        for (key, record) in self.medications.iter_mut() {
            if record.config.id != *key {
                record.config.id = key.clone();
                changed = true;
            }
            if record.config.migrate_legacy_unit() {
                tracing::info!(medication_id = %key, "Migrated legacy dosage unit");
                changed = true;
            }
            if record.state.remaining_amount < 0.0 {
                record.state.remaining_amount = 0.0;
                changed = true;
            }
            let missed = &mut record.state.missed_doses;
            let before = missed.clone();
            missed.sort();
            missed.dedup();
            if missed.len() > crate::scheduling::MAX_MISSED_DOSES {
                let excess = missed.len() - crate::scheduling::MAX_MISSED_DOSES;
                missed.drain(..excess);
            }
            if *missed != before {
                changed = true;
            }
        }
        changed
    }
}
