//! Paced stream of simulated trials for closed-loop sessions

use bci_core::{BciError, BciResult, Epoch, StimulusClass};
use crate::epoch_simulator::{EpochSimulator, SimulationConfig};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the trial stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Epoch simulation configuration
    pub simulation: SimulationConfig,
    /// Pause between trials in milliseconds
    pub trial_interval_ms: u64,
    /// Flashing objects on screen; one of them is the target
    pub object_count: u32,
    /// Broadcast buffer size (trials kept for slow subscribers)
    pub buffer_size: usize,
    /// Stop after this many trials
    pub max_trials: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            trial_interval_ms: 2000,
            object_count: 3,
            buffer_size: 32,
            max_trials: None,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> BciResult<()> {
        self.simulation.validate()?;
        if self.trial_interval_ms == 0 {
            return Err(BciError::invalid_config("Trial interval must be greater than 0"));
        }
        if self.object_count == 0 {
            return Err(BciError::invalid_config("Object count must be greater than 0"));
        }
        if self.buffer_size == 0 {
            return Err(BciError::invalid_config("Buffer size must be greater than 0"));
        }
        Ok(())
    }

    /// Chance that a flash is the target
    pub fn target_probability(&self) -> f64 {
        1.0 / self.object_count.max(1) as f64
    }
}

/// One simulated trial handed to subscribers
#[derive(Debug, Clone)]
pub struct StreamedTrial {
    pub trial_number: u32,
    pub epoch: Epoch,
}

impl StreamedTrial {
    pub fn stimulus_class(&self) -> Option<StimulusClass> {
        self.epoch.label
    }
}

/// Commands for controlling the stream
#[derive(Debug, Clone)]
pub enum StreamCommand {
    Start,
    Stop,
    Pause,
    Resume,
    SetTrialInterval(u64),
    SetObjectCount(u32),
    SetNoiseLevel(f64),
    Shutdown,
}

/// Trial stream driven by a tokio interval
pub struct TrialStream {
    config: StreamConfig,
    simulator: EpochSimulator,
    data_sender: broadcast::Sender<StreamedTrial>,
    control_receiver: mpsc::Receiver<StreamCommand>,
    control_sender: mpsc::Sender<StreamCommand>,
    is_running: bool,
    trials_emitted: u32,
}

impl TrialStream {
    /// Create new trial stream
    pub fn new(config: StreamConfig) -> BciResult<Self> {
        config.validate()?;
        let simulator = EpochSimulator::new(config.simulation.clone())?;
        let (data_sender, _) = broadcast::channel(config.buffer_size);
        let (control_sender, control_receiver) = mpsc::channel(32);

        Ok(TrialStream {
            config,
            simulator,
            data_sender,
            control_receiver,
            control_sender,
            is_running: false,
            trials_emitted: 0,
        })
    }

    /// Get a receiver for trial updates
    pub fn subscribe(&self) -> broadcast::Receiver<StreamedTrial> {
        self.data_sender.subscribe()
    }

    /// Get control sender for sending commands
    pub fn control_handle(&self) -> mpsc::Sender<StreamCommand> {
        self.control_sender.clone()
    }

    pub fn trials_emitted(&self) -> u32 {
        self.trials_emitted
    }

    fn pacing(&self) -> tokio::time::Interval {
        let mut timer = interval(Duration::from_millis(self.config.trial_interval_ms));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    /// Run until shutdown, the trial limit, or every control handle is dropped
    pub async fn run(&mut self) -> BciResult<()> {
        let mut timer = self.pacing();

        info!(
            interval_ms = self.config.trial_interval_ms,
            objects = self.config.object_count,
            "Trial stream ready"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if self.is_running {
                        self.emit_trial()?;
                        if let Some(max) = self.config.max_trials {
                            if self.trials_emitted >= max {
                                info!(trials = self.trials_emitted, "Trial limit reached");
                                break;
                            }
                        }
                    }
                }

                command = self.control_receiver.recv() => {
                    match command {
                        Some(StreamCommand::Start) => {
                            self.is_running = true;
                            info!("Trial stream started");
                        }
                        Some(StreamCommand::Stop) => {
                            self.is_running = false;
                            self.trials_emitted = 0;
                            info!("Trial stream stopped");
                        }
                        Some(StreamCommand::Pause) => {
                            self.is_running = false;
                            info!("Trial stream paused");
                        }
                        Some(StreamCommand::Resume) => {
                            self.is_running = true;
                            info!("Trial stream resumed");
                        }
                        Some(StreamCommand::SetTrialInterval(ms)) => {
                            if ms == 0 {
                                warn!("Ignoring zero trial interval");
                            } else if ms != self.config.trial_interval_ms {
                                self.config.trial_interval_ms = ms;
                                timer = self.pacing();
                                // The fresh interval fires immediately; skip that tick.
                                timer.tick().await;
                                debug!(interval_ms = ms, "Trial interval updated");
                            }
                        }
                        Some(StreamCommand::SetObjectCount(count)) => {
                            if count == 0 {
                                warn!("Ignoring zero object count");
                            } else {
                                self.config.object_count = count;
                                debug!(objects = count, "Object count updated");
                            }
                        }
                        Some(StreamCommand::SetNoiseLevel(level)) => {
                            if let Err(e) = self.simulator.set_noise_level(level) {
                                warn!("Failed to update noise level: {}", e);
                            } else {
                                self.config.simulation.noise_level = level;
                            }
                        }
                        Some(StreamCommand::Shutdown) => {
                            info!("Trial stream shutting down");
                            break;
                        }
                        None => {
                            info!("Control channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn emit_trial(&mut self) -> BciResult<()> {
        let p_target = self.config.target_probability();
        let class = if self.simulator.rng().gen_bool(p_target) {
            StimulusClass::Target
        } else {
            StimulusClass::NonTarget
        };

        let epoch = self.simulator.simulate(class)?;
        self.trials_emitted += 1;

        let trial = StreamedTrial {
            trial_number: self.trials_emitted,
            epoch,
        };
        debug!(trial = trial.trial_number, class = %class, "Emitting trial");

        // Send to subscribers (ignore if no receivers)
        let _ = self.data_sender.send(trial);
        Ok(())
    }
}

/// Helper function to start a trial stream in the background
pub fn spawn_trial_stream(
    config: StreamConfig,
) -> BciResult<(
    broadcast::Receiver<StreamedTrial>,
    mpsc::Sender<StreamCommand>,
    tokio::task::JoinHandle<BciResult<()>>,
)> {
    let mut stream = TrialStream::new(config)?;
    let receiver = stream.subscribe();
    let control = stream.control_handle();

    let handle = tokio::spawn(async move { stream.run().await });

    Ok((receiver, control, handle))
}
