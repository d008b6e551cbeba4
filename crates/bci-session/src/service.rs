//! Session service: trial recording and adaptive difficulty around the pipeline

use crate::config::ServiceConfig;
use crate::store::SessionStore;
use bci_core::{
    rolling_accuracy, BciError, BciResult, CalibrationState, Epoch, FeatureVector, Label, Prediction,
    PredictionRecord, Session, StimulusClass, TrialRecord,
};
use bci_processing::{DifficultyController, DifficultyUpdate, Pipeline, SmoothedDecision, TrialSmoother};
use bci_simulation::EpochSimulator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Build the shared pipeline, training it on simulated epochs when no fixed
/// classifier parameters are configured
pub fn build_pipeline(config: &ServiceConfig) -> BciResult<Pipeline> {
    config.validate()?;
    let mut pipeline = Pipeline::from_config(&config.processing)?;

    if !pipeline.classifier().is_trained() {
        let per_class = config.processing.classifier.training_epochs_per_class;
        let mut simulator = EpochSimulator::new(config.simulation.clone())?;
        let epochs = simulator.simulate_batch(per_class, per_class)?;
        let report = pipeline.train_from_epochs(&epochs)?;

        info!(
            yes = report.yes_samples,
            no = report.no_samples,
            identity_fallback = report.identity_fallback,
            "Classifier trained on simulated epochs"
        );
    }

    Ok(pipeline)
}

/// One completed trial as reported by the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSubmission {
    pub trial_number: u32,
    pub stimulus_class: StimulusClass,
    pub response_time_ms: f64,
    pub correct: bool,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub features: Option<FeatureVector>,
}

impl TrialSubmission {
    pub fn validate(&self) -> BciResult<()> {
        if self.trial_number == 0 {
            return Err(BciError::invalid_input("Trial numbers start at 1"));
        }
        if !self.response_time_ms.is_finite() || self.response_time_ms < 0.0 {
            return Err(BciError::invalid_input("Response time must be a non-negative number"));
        }
        if let Some(prediction) = &self.prediction {
            if !(0.0..=1.0).contains(&prediction.confidence) {
                return Err(BciError::invalid_input("Prediction confidence must be in [0, 1]"));
            }
        }
        if let Some(features) = &self.features {
            if !features.is_finite() {
                return Err(BciError::invalid_input("Feature values must be finite"));
            }
        }
        Ok(())
    }
}

/// State after a trial has been recorded
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialOutcome {
    pub trial: TrialRecord,
    pub session: Session,
    pub calibration: CalibrationState,
    pub difficulty: DifficultyUpdate,
}

impl TrialOutcome {
    pub fn notification(&self) -> &str {
        &self.difficulty.notification
    }
}

/// Coordinates the pipeline, the store and the difficulty controller
///
/// Writes for one session are serialised through a per-session lock so the
/// calibration read-modify-write never loses an update.
pub struct SessionService<S: SessionStore> {
    store: Arc<S>,
    pipeline: Arc<Pipeline>,
    smoother: TrialSmoother,
    controller: DifficultyController,
    accuracy_window: usize,
    initial_calibration: CalibrationState,
    session_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S: SessionStore> SessionService<S> {
    pub fn new(store: Arc<S>, pipeline: Arc<Pipeline>, config: &ServiceConfig) -> BciResult<Self> {
        config.validate()?;
        Ok(SessionService {
            store,
            pipeline,
            smoother: TrialSmoother::new(config.processing.smoothing.window_size),
            controller: DifficultyController,
            accuracy_window: config.accuracy_window,
            initial_calibration: config.calibration.to_state(),
            session_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write lock of an existing session; unknown ids never get an entry
    async fn session_lock(&self, session_id: Uuid) -> BciResult<Arc<Mutex<()>>> {
        let mut locks = self.session_locks.lock().await;
        if let Some(lock) = locks.get(&session_id) {
            return Ok(Arc::clone(lock));
        }

        self.store.get_session(session_id)?;
        let lock = Arc::new(Mutex::new(()));
        locks.insert(session_id, Arc::clone(&lock));
        Ok(lock)
    }

    /// Drop the lock entry of a session the store no longer knows
    async fn forget_if_missing<T>(&self, session_id: Uuid, result: BciResult<T>) -> BciResult<T> {
        if matches!(&result, Err(e) if e.is_not_found()) {
            self.session_locks.lock().await.remove(&session_id);
        }
        result
    }

    pub async fn create_session(&self, participant: &str) -> BciResult<Session> {
        let participant = participant.trim();
        if participant.is_empty() {
            return Err(BciError::invalid_input("Participant name must not be empty"));
        }

        let calibration = CalibrationState {
            updated_at: Utc::now(),
            ..self.initial_calibration.clone()
        };
        let session = self.store.create_session(Session::new(participant), calibration)?;
        info!(session = %session.id, participant = %session.participant, "Session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> BciResult<Session> {
        self.store.get_session(session_id)
    }

    pub async fn get_calibration(&self, session_id: Uuid) -> BciResult<CalibrationState> {
        self.store.get_calibration(session_id)
    }

    pub async fn list_trials(&self, session_id: Uuid) -> BciResult<Vec<TrialRecord>> {
        self.store.list_trials(session_id)
    }

    /// Delete a session with its trials, predictions and calibration
    pub async fn delete_session(&self, session_id: Uuid) -> BciResult<()> {
        let lock = self.session_lock(session_id).await?;
        let _guard = lock.lock().await;

        let result = self.store.delete_session(session_id);
        if result.is_ok() || matches!(&result, Err(e) if e.is_not_found()) {
            self.session_locks.lock().await.remove(&session_id);
        }
        result?;
        info!(session = %session_id, "Session deleted");
        Ok(())
    }

    /// Record a trial and adapt the session's difficulty
    pub async fn record_trial(&self, session_id: Uuid, submission: TrialSubmission) -> BciResult<TrialOutcome> {
        submission.validate()?;

        let lock = self.session_lock(session_id).await?;
        let result = {
            let _guard = lock.lock().await;
            self.record_locked(session_id, submission)
        };
        self.forget_if_missing(session_id, result).await
    }

    /// Classify an epoch with the session's threshold, then record it
    ///
    /// The trial is correct when the decision agrees with the stimulus
    /// (YES for a target). A pipeline error leaves the session untouched.
    pub async fn submit_epoch(
        &self,
        session_id: Uuid,
        trial_number: u32,
        epoch: &Epoch,
        response_time_ms: f64,
    ) -> BciResult<TrialOutcome> {
        let stimulus_class = epoch
            .label
            .ok_or_else(|| BciError::invalid_input("Epoch must carry its stimulus class"))?;

        let lock = self.session_lock(session_id).await?;
        let result = {
            let _guard = lock.lock().await;
            self.submit_locked(session_id, trial_number, epoch, stimulus_class, response_time_ms)
        };
        self.forget_if_missing(session_id, result).await
    }

    fn submit_locked(
        &self,
        session_id: Uuid,
        trial_number: u32,
        epoch: &Epoch,
        stimulus_class: StimulusClass,
        response_time_ms: f64,
    ) -> BciResult<TrialOutcome> {
        let calibration = self.store.get_calibration(session_id)?;
        let result = self
            .pipeline
            .run_with_threshold(epoch, calibration.confidence_threshold)
            .map_err(|e| {
                warn!(session = %session_id, trial = trial_number, "Pipeline failed: {}", e);
                e
            })?;

        let submission = TrialSubmission {
            trial_number,
            stimulus_class,
            response_time_ms,
            correct: is_correct(result.prediction.label, stimulus_class),
            prediction: Some(result.prediction),
            features: Some(result.features),
        };
        submission.validate()?;
        self.record_locked(session_id, submission)
    }

    fn record_locked(&self, session_id: Uuid, submission: TrialSubmission) -> BciResult<TrialOutcome> {
        self.store.get_session(session_id)?;

        let mut record = TrialRecord::new(
            session_id,
            submission.trial_number,
            submission.stimulus_class,
            submission.response_time_ms,
            submission.correct,
        );
        if let Some(prediction) = submission.prediction {
            record = record.with_prediction(PredictionRecord::new(prediction, submission.features));
        }

        let trial = self.store.upsert_trial(record)?;
        let session = self.store.refresh_aggregates(session_id)?;

        let trials = self.store.list_trials(session_id)?;
        let recent_accuracy = rolling_accuracy(&trials, self.accuracy_window);

        let current = self.store.get_calibration(session_id)?;
        let difficulty = self
            .controller
            .adapt(recent_accuracy, current.flash_speed, current.object_count);

        let calibration = self.store.update_calibration(
            session_id,
            CalibrationState {
                flash_speed: difficulty.flash_speed,
                object_count: difficulty.object_count,
                recent_accuracy,
                ..current
            },
        )?;

        info!(
            session = %session_id,
            trial = trial.trial_number,
            correct = trial.correct,
            accuracy = session.accuracy,
            recent_accuracy,
            "Trial recorded"
        );

        Ok(TrialOutcome {
            trial,
            session,
            calibration,
            difficulty,
        })
    }

    /// Smoothed decision over the session's prediction history
    pub async fn smoothed_decision(&self, session_id: Uuid) -> BciResult<SmoothedDecision> {
        let trials = self.store.list_trials(session_id)?;
        let history: Vec<Prediction> = trials
            .iter()
            .filter_map(|t| t.latest_prediction().map(PredictionRecord::prediction))
            .collect();

        let decision = self.smoother.smooth(&history);
        debug!(
            session = %session_id,
            decision = %decision.decision,
            confidence = decision.confidence,
            "Smoothed decision"
        );
        Ok(decision)
    }

    /// Change the decision threshold and/or trial pacing of a session
    pub async fn update_calibration_settings(
        &self,
        session_id: Uuid,
        confidence_threshold: Option<f64>,
        trial_interval_ms: Option<u64>,
    ) -> BciResult<CalibrationState> {
        if let Some(threshold) = confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(BciError::invalid_input("Confidence threshold must be in [0, 1]"));
            }
        }
        if trial_interval_ms == Some(0) {
            return Err(BciError::invalid_input("Trial interval must be greater than 0"));
        }

        let lock = self.session_lock(session_id).await?;
        let result = {
            let _guard = lock.lock().await;
            self.store.get_calibration(session_id).and_then(|mut calibration| {
                if let Some(threshold) = confidence_threshold {
                    calibration.confidence_threshold = threshold;
                }
                if let Some(interval) = trial_interval_ms {
                    calibration.trial_interval_ms = interval;
                }
                self.store.update_calibration(session_id, calibration)
            })
        };
        self.forget_if_missing(session_id, result).await
    }
}

/// YES is correct for a target, NO for a non-target
pub fn is_correct(decision: Label, stimulus_class: StimulusClass) -> bool {
    decision == stimulus_class.expected_label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use bci_processing::{FixedParameters, LdaClassifier, PipelineBuilder};
    use bci_simulation::SimulationConfig;

    fn service_with(pipeline: Pipeline) -> SessionService<InMemoryStore> {
        SessionService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(pipeline),
            &ServiceConfig::default(),
        )
        .unwrap()
    }

    fn untrained_service() -> SessionService<InMemoryStore> {
        service_with(PipelineBuilder::new().build().unwrap())
    }

    fn submission(trial_number: u32, correct: bool) -> TrialSubmission {
        TrialSubmission {
            trial_number,
            stimulus_class: StimulusClass::Target,
            response_time_ms: 420.0,
            correct,
            prediction: Some(Prediction::new(if correct { Label::Yes } else { Label::No }, 0.7)),
            features: None,
        }
    }

    fn noiseless_config() -> ServiceConfig {
        let mut config = ServiceConfig {
            simulation: SimulationConfig {
                noise_level: 0.0,
                seed: Some(5),
                ..SimulationConfig::default()
            },
            ..ServiceConfig::default()
        };
        config.processing.classifier.training_epochs_per_class = 5;
        config
    }

    #[tokio::test]
    async fn test_create_session_with_default_calibration() {
        let service = untrained_service();
        let session = service.create_session("kid-01").await.unwrap();

        assert_eq!(session.total_trials, 0);
        assert_eq!(session.accuracy, 0.0);
        let calibration = service.get_calibration(session.id).await.unwrap();
        assert_eq!(calibration.object_count, 3);
        assert_eq!(calibration.flash_speed, 1.0);

        assert!(service.create_session("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_record_trial_adapts_difficulty() {
        let service = untrained_service();
        let session = service.create_session("kid-02").await.unwrap();

        let first = service.record_trial(session.id, submission(1, true)).await.unwrap();
        assert_eq!(first.session.total_trials, 1);
        assert_eq!(first.calibration.recent_accuracy, 1.0);
        assert_eq!(first.calibration.object_count, 4);
        assert!((first.calibration.flash_speed - 1.1).abs() < 1e-12);
        assert!(first.notification().contains("add an object"));

        for n in 2..=6 {
            let outcome = service.record_trial(session.id, submission(n, true)).await.unwrap();
            assert!(outcome.calibration.flash_speed <= 1.5);
            assert_eq!(outcome.calibration.object_count, 4);
        }

        let session = service.get_session(session.id).await.unwrap();
        assert_eq!(session.total_trials, 6);
        assert_eq!(session.accuracy, 1.0);
    }

    #[tokio::test]
    async fn test_rolling_accuracy_only_counts_recent_trials() {
        let service = untrained_service();
        let session = service.create_session("kid-03").await.unwrap();

        for n in 1..=5 {
            service.record_trial(session.id, submission(n, true)).await.unwrap();
        }
        let mut last = None;
        for n in 6..=10 {
            last = Some(service.record_trial(session.id, submission(n, false)).await.unwrap());
        }

        let last = last.unwrap();
        assert_eq!(last.calibration.recent_accuracy, 0.0);
        assert_eq!(last.session.accuracy, 0.5);
        assert_eq!(last.calibration.object_count, 3);
    }

    #[tokio::test]
    async fn test_resubmitted_trial_is_corrected_not_duplicated() {
        let service = untrained_service();
        let session = service.create_session("kid-04").await.unwrap();

        service.record_trial(session.id, submission(1, false)).await.unwrap();
        let outcome = service.record_trial(session.id, submission(1, true)).await.unwrap();

        assert_eq!(outcome.session.total_trials, 1);
        assert_eq!(outcome.session.accuracy, 1.0);
        assert_eq!(outcome.trial.predictions.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let service = untrained_service();
        let err = service.record_trial(Uuid::new_v4(), submission(1, true)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(service.smoothed_decision(Uuid::new_v4()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_submission_leaves_session_untouched() {
        let service = untrained_service();
        let session = service.create_session("kid-05").await.unwrap();

        let mut bad = submission(1, true);
        bad.response_time_ms = f64::NAN;
        assert!(matches!(
            service.record_trial(session.id, bad).await,
            Err(BciError::InvalidInput { .. })
        ));
        assert!(service.record_trial(session.id, submission(0, true)).await.is_err());

        assert!(service.list_trials(session.id).await.unwrap().is_empty());
        assert_eq!(service.get_session(session.id).await.unwrap().total_trials, 0);
    }

    #[tokio::test]
    async fn test_failed_epoch_is_not_counted() {
        let service = untrained_service();
        let session = service.create_session("kid-06").await.unwrap();
        let before = service.get_calibration(session.id).await.unwrap();

        let empty = Epoch::new(vec![], vec![], 250.0, Some(StimulusClass::Target)).unwrap();
        assert!(service.submit_epoch(session.id, 1, &empty, 400.0).await.is_err());

        assert!(service.list_trials(session.id).await.unwrap().is_empty());
        let after = service.get_calibration(session.id).await.unwrap();
        assert_eq!(after.recent_accuracy, before.recent_accuracy);
        assert_eq!(after.object_count, before.object_count);
    }

    #[tokio::test]
    async fn test_submit_epoch_with_trained_pipeline() {
        let config = noiseless_config();
        let pipeline = build_pipeline(&config).unwrap();
        assert!(pipeline.classifier().is_trained());

        let service = SessionService::new(Arc::new(InMemoryStore::new()), Arc::new(pipeline), &config).unwrap();
        let session = service.create_session("kid-07").await.unwrap();

        let mut simulator = EpochSimulator::new(config.simulation.clone()).unwrap();
        let target = simulator.simulate(StimulusClass::Target).unwrap();
        let non_target = simulator.simulate(StimulusClass::NonTarget).unwrap();

        let first = service.submit_epoch(session.id, 1, &target, 350.0).await.unwrap();
        assert!(first.trial.correct);
        assert_eq!(first.trial.latest_prediction().unwrap().label, Label::Yes);
        assert!(first.trial.latest_prediction().unwrap().features.is_some());

        let second = service.submit_epoch(session.id, 2, &non_target, 500.0).await.unwrap();
        assert!(second.trial.correct);
        assert_eq!(second.session.accuracy, 1.0);

        let unlabeled = target.unlabeled();
        assert!(service.submit_epoch(session.id, 3, &unlabeled, 300.0).await.is_err());
    }

    #[tokio::test]
    async fn test_session_threshold_drives_decision() {
        // All-zero weights: every epoch scores confidence 0.5
        let pipeline = PipelineBuilder::new()
            .classifier(LdaClassifier::with_parameters([0.0, 0.0, 0.0], 0.0))
            .build()
            .unwrap();
        let service = service_with(pipeline);
        let session = service.create_session("kid-08").await.unwrap();

        let mut simulator = EpochSimulator::new(SimulationConfig {
            seed: Some(8),
            ..SimulationConfig::default()
        })
        .unwrap();
        let target = simulator.simulate(StimulusClass::Target).unwrap();

        let outcome = service.submit_epoch(session.id, 1, &target, 400.0).await.unwrap();
        assert!(!outcome.trial.correct);

        service
            .update_calibration_settings(session.id, Some(0.3), None)
            .await
            .unwrap();
        let outcome = service.submit_epoch(session.id, 2, &target, 400.0).await.unwrap();
        assert!(outcome.trial.correct);
    }

    #[tokio::test]
    async fn test_smoothed_decision_over_history() {
        let service = untrained_service();
        let session = service.create_session("kid-09").await.unwrap();

        let empty = service.smoothed_decision(session.id).await.unwrap();
        assert_eq!(empty.decision, Label::No);
        assert_eq!(empty.confidence, 0.5);

        let history = [(Label::Yes, 0.85), (Label::Yes, 0.72), (Label::No, 0.55)];
        for (i, (label, confidence)) in history.into_iter().enumerate() {
            let mut sub = submission(i as u32 + 1, label.is_yes());
            sub.prediction = Some(Prediction::new(label, confidence));
            service.record_trial(session.id, sub).await.unwrap();
        }

        let smoothed = service.smoothed_decision(session.id).await.unwrap();
        assert_eq!(smoothed.decision, Label::Yes);
        assert!((smoothed.confidence - 0.7).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_update_calibration_settings_validation() {
        let service = untrained_service();
        let session = service.create_session("kid-10").await.unwrap();

        let updated = service
            .update_calibration_settings(session.id, Some(0.65), Some(1500))
            .await
            .unwrap();
        assert_eq!(updated.confidence_threshold, 0.65);
        assert_eq!(updated.trial_interval_ms, 1500);

        assert!(service.update_calibration_settings(session.id, Some(1.2), None).await.is_err());
        assert!(service.update_calibration_settings(session.id, None, Some(0)).await.is_err());
        assert!(service
            .update_calibration_settings(Uuid::new_v4(), Some(0.5), None)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let service = untrained_service();
        let session = service.create_session("kid-11").await.unwrap();
        service.record_trial(session.id, submission(1, true)).await.unwrap();

        service.delete_session(session.id).await.unwrap();
        assert!(service.get_session(session.id).await.unwrap_err().is_not_found());
        assert!(service.list_trials(session.id).await.unwrap_err().is_not_found());
        assert!(service.get_calibration(session.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_sessions_leave_no_lock_entries() {
        let service = untrained_service();
        let mut simulator = EpochSimulator::new(SimulationConfig {
            seed: Some(13),
            ..SimulationConfig::default()
        })
        .unwrap();
        let epoch = simulator.simulate(StimulusClass::Target).unwrap();

        for _ in 0..100 {
            let id = Uuid::new_v4();
            assert!(service.record_trial(id, submission(1, true)).await.unwrap_err().is_not_found());
            assert!(service.submit_epoch(id, 1, &epoch, 400.0).await.unwrap_err().is_not_found());
            assert!(service
                .update_calibration_settings(id, Some(0.4), None)
                .await
                .unwrap_err()
                .is_not_found());
            assert!(service.delete_session(id).await.unwrap_err().is_not_found());
        }
        assert!(service.session_locks.lock().await.is_empty());

        let session = service.create_session("kid-13").await.unwrap();
        service.record_trial(session.id, submission(1, true)).await.unwrap();
        assert_eq!(service.session_locks.lock().await.len(), 1);

        service.delete_session(session.id).await.unwrap();
        assert!(service.record_trial(session.id, submission(2, true)).await.unwrap_err().is_not_found());
        assert!(service.session_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_removed_behind_service_releases_lock() {
        let service = untrained_service();
        let session = service.create_session("kid-14").await.unwrap();
        service.record_trial(session.id, submission(1, true)).await.unwrap();

        service.store().delete_session(session.id).unwrap();
        assert!(service.record_trial(session.id, submission(2, true)).await.unwrap_err().is_not_found());
        assert!(service.session_locks.lock().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_trials_do_not_lose_updates() {
        let service = Arc::new(untrained_service());
        let session = service.create_session("kid-12").await.unwrap();

        let handles: Vec<_> = (1..=20)
            .map(|n| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.record_trial(session.id, submission(n, n % 2 == 0)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = service.get_session(session.id).await.unwrap();
        assert_eq!(session.total_trials, 20);
        assert_eq!(session.accuracy, 0.5);
        assert_eq!(service.list_trials(session.id).await.unwrap().len(), 20);

        let calibration = service.get_calibration(session.id).await.unwrap();
        assert!((0.6..=1.5).contains(&calibration.flash_speed));
        assert!((3..=4).contains(&calibration.object_count));
    }

    #[test]
    fn test_fixed_parameters_skip_training() {
        let mut config = ServiceConfig::default();
        config.processing.classifier.fixed_parameters = Some(FixedParameters {
            weights: [0.0, 1.0, 0.0],
            bias: -2.5,
        });
        let pipeline = build_pipeline(&config).unwrap();
        let model = pipeline.classifier().model().unwrap();
        assert_eq!(model.weights, [0.0, 1.0, 0.0]);
        assert_eq!(model.bias, -2.5);
    }

    #[test]
    fn test_is_correct() {
        assert!(is_correct(Label::Yes, StimulusClass::Target));
        assert!(is_correct(Label::No, StimulusClass::NonTarget));
        assert!(!is_correct(Label::No, StimulusClass::Target));
    }
}
