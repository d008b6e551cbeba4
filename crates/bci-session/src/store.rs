//! Persistence collaborator for sessions, trials and calibration state

use bci_core::{BciError, BciResult, CalibrationState, Session, TrialRecord};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Storage operations the session service depends on
///
/// A session exclusively owns its trials (and their predictions) and its
/// calibration state; deleting the session removes all of them.
pub trait SessionStore: Send + Sync {
    /// Persist a new session together with its initial calibration
    fn create_session(&self, session: Session, calibration: CalibrationState) -> BciResult<Session>;

    fn get_session(&self, id: Uuid) -> BciResult<Session>;

    fn list_sessions(&self) -> BciResult<Vec<Session>>;

    /// Insert or correct the trial keyed by (session, trial number)
    ///
    /// On correction the stored id and creation time are kept, the trial
    /// fields are replaced and the new predictions are appended.
    fn upsert_trial(&self, trial: TrialRecord) -> BciResult<TrialRecord>;

    /// Trials of a session ordered by trial number
    fn list_trials(&self, session_id: Uuid) -> BciResult<Vec<TrialRecord>>;

    fn get_calibration(&self, session_id: Uuid) -> BciResult<CalibrationState>;

    fn update_calibration(&self, session_id: Uuid, calibration: CalibrationState) -> BciResult<CalibrationState>;

    /// Recompute and persist `accuracy` and `total_trials`
    fn refresh_aggregates(&self, session_id: Uuid) -> BciResult<Session>;

    /// Remove a session with its trials, predictions and calibration
    fn delete_session(&self, id: Uuid) -> BciResult<()>;
}

struct SessionEntry {
    session: Session,
    calibration: CalibrationState,
    trials: BTreeMap<u32, TrialRecord>,
}

fn session_not_found(id: Uuid) -> BciError {
    BciError::NotFound {
        entity: "session",
        id: id.to_string(),
    }
}

/// Process-local store backed by a lock-protected map
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BciResult<RwLockReadGuard<'_, HashMap<Uuid, SessionEntry>>> {
        self.sessions.read().map_err(|_| BciError::OperationFailed {
            reason: "session store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> BciResult<RwLockWriteGuard<'_, HashMap<Uuid, SessionEntry>>> {
        self.sessions.write().map_err(|_| BciError::OperationFailed {
            reason: "session store lock poisoned".to_string(),
        })
    }
}

impl SessionStore for InMemoryStore {
    fn create_session(&self, session: Session, calibration: CalibrationState) -> BciResult<Session> {
        let mut sessions = self.write()?;
        if sessions.contains_key(&session.id) {
            return Err(BciError::OperationFailed {
                reason: format!("session {} already exists", session.id),
            });
        }

        sessions.insert(
            session.id,
            SessionEntry {
                session: session.clone(),
                calibration,
                trials: BTreeMap::new(),
            },
        );
        Ok(session)
    }

    fn get_session(&self, id: Uuid) -> BciResult<Session> {
        let sessions = self.read()?;
        sessions
            .get(&id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| session_not_found(id))
    }

    fn list_sessions(&self) -> BciResult<Vec<Session>> {
        let sessions = self.read()?;
        let mut list: Vec<Session> = sessions.values().map(|e| e.session.clone()).collect();
        list.sort_by_key(|s| s.created_at);
        Ok(list)
    }

    fn upsert_trial(&self, trial: TrialRecord) -> BciResult<TrialRecord> {
        let mut sessions = self.write()?;
        let entry = sessions
            .get_mut(&trial.session_id)
            .ok_or_else(|| session_not_found(trial.session_id))?;

        let stored = match entry.trials.get_mut(&trial.trial_number) {
            Some(existing) => {
                existing.stimulus_class = trial.stimulus_class;
                existing.response_time_ms = trial.response_time_ms;
                existing.correct = trial.correct;
                existing.predictions.extend(trial.predictions);
                existing.clone()
            }
            None => {
                entry.trials.insert(trial.trial_number, trial.clone());
                trial
            }
        };
        Ok(stored)
    }

    fn list_trials(&self, session_id: Uuid) -> BciResult<Vec<TrialRecord>> {
        let sessions = self.read()?;
        let entry = sessions.get(&session_id).ok_or_else(|| session_not_found(session_id))?;
        Ok(entry.trials.values().cloned().collect())
    }

    fn get_calibration(&self, session_id: Uuid) -> BciResult<CalibrationState> {
        let sessions = self.read()?;
        sessions
            .get(&session_id)
            .map(|entry| entry.calibration.clone())
            .ok_or_else(|| session_not_found(session_id))
    }

    fn update_calibration(&self, session_id: Uuid, calibration: CalibrationState) -> BciResult<CalibrationState> {
        let mut sessions = self.write()?;
        let entry = sessions.get_mut(&session_id).ok_or_else(|| session_not_found(session_id))?;
        entry.calibration = CalibrationState {
            updated_at: Utc::now(),
            ..calibration
        };
        Ok(entry.calibration.clone())
    }

    fn refresh_aggregates(&self, session_id: Uuid) -> BciResult<Session> {
        let mut sessions = self.write()?;
        let entry = sessions.get_mut(&session_id).ok_or_else(|| session_not_found(session_id))?;
        let trials: Vec<TrialRecord> = entry.trials.values().cloned().collect();
        entry.session.recompute_aggregates(&trials);
        Ok(entry.session.clone())
    }

    fn delete_session(&self, id: Uuid) -> BciResult<()> {
        let mut sessions = self.write()?;
        sessions.remove(&id).map(|_| ()).ok_or_else(|| session_not_found(id))
    }
}
