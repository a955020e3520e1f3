//! The lane filter node.
//!
//! [`LaneFilterNode`] owns one [`LaneFilterImpl`] and drives it once per
//! segment batch: predict with the latest velocity command over the time
//! since the previous cycle, update with the batch, extract the estimate,
//! classify curvature, and package everything the outside world consumes.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use laneloc_runtime::node::LaneFilterNode;
//! use laneloc_types::{LaneFilterConfig, SegmentBatch};
//!
//! let mut node = LaneFilterNode::new(LaneFilterConfig::default()).unwrap();
//! let now = Utc::now();
//! let out = node
//!     .process(&SegmentBatch { stamp: now, segments: Vec::new() }, now)
//!     .unwrap();
//! assert_eq!(out.pose.stamp, now);
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use laneloc_middleware::{EventBus, Topic};
use laneloc_perception::curvature::{CurvatureHistory, PoseSample};
use laneloc_perception::filter::{LaneFilter, LaneFilterImpl};
use laneloc_perception::observation::SensingRange;
use laneloc_types::{
    BeliefImage, Event, EventPayload, FilterDiagnostics, LaneError, LaneFilterConfig, LanePose,
    LaneStatus, SegmentBatch, VelocityCommand,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::motion_state::MotionState;

const SOURCE: &str = "laneloc-runtime::node";

/// Consecutive degenerate recoveries after which the node logs an error.
const RECOVERY_ALARM_THRESHOLD: u32 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one processed batch produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    pub pose: LanePose,
    pub image: BeliefImage,
    pub diagnostics: FilterDiagnostics,
    /// Seconds of motion predicted this cycle.
    pub dt: f64,
}

impl CycleOutput {
    /// The outbound bus events, in publishing order.
    pub fn into_events(self) -> Vec<Event> {
        let in_lane = EventPayload::InLane {
            stamp: self.pose.stamp,
            in_lane: self.pose.in_lane,
        };
        vec![
            Event::new(SOURCE, EventPayload::LanePose(self.pose)),
            Event::new(SOURCE, in_lane),
            Event::new(SOURCE, EventPayload::BeliefImage(self.image)),
            Event::new(SOURCE, EventPayload::Diagnostics(self.diagnostics)),
        ]
    }
}

/// How a configuration change was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigured {
    /// Parameters swapped; the belief was kept.
    Retuned,
    /// Grid, prior or filter kind changed; a fresh filter was seeded.
    Rebuilt,
}

// ─────────────────────────────────────────────────────────────────────────────
// LaneFilterNode
// ─────────────────────────────────────────────────────────────────────────────

pub struct LaneFilterNode {
    config: LaneFilterConfig,
    filter: LaneFilterImpl,
    motion: MotionState,
    history: CurvatureHistory,
    enabled: bool,
    last_update: Option<DateTime<Utc>>,
    disabled_since: Option<DateTime<Utc>>,
    /// Time spent disabled since `last_update`.
    paused: TimeDelta,
    consecutive_recoveries: u32,
}

impl LaneFilterNode {
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] when `config` is invalid.
    pub fn new(config: LaneFilterConfig) -> Result<Self, LaneError> {
        let filter = LaneFilterImpl::from_config(&config)?;
        Ok(Self {
            motion: MotionState::new(config.motion.stale_after_secs),
            history: CurvatureHistory::new(config.curvature.history_len),
            config,
            filter,
            enabled: true,
            last_update: None,
            disabled_since: None,
            paused: TimeDelta::zero(),
            consecutive_recoveries: 0,
        })
    }

    pub fn config(&self) -> &LaneFilterConfig {
        &self.config
    }

    pub fn filter(&self) -> &LaneFilterImpl {
        &self.filter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn consecutive_recoveries(&self) -> u32 {
        self.consecutive_recoveries
    }

    /// Record the latest velocity command.
    pub fn set_velocity(&mut self, cmd: VelocityCommand) {
        self.motion.set(cmd);
    }

    /// Enable or suspend processing. Time spent suspended is not predicted
    /// over when processing resumes.
    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        if enabled == self.enabled {
            return;
        }
        if enabled {
            if let Some(since) = self.disabled_since.take() {
                self.paused += (now - since).max(TimeDelta::zero());
            }
            info!("lane filter enabled");
        } else {
            self.disabled_since = Some(now);
            info!("lane filter disabled");
        }
        self.enabled = enabled;
    }

    /// Run one filter cycle for `batch`, with `now` as the local clock.
    ///
    /// Returns `None` while disabled.
    #[instrument(skip_all, fields(segments = batch.segments.len()))]
    pub fn process(&mut self, batch: &SegmentBatch, now: DateTime<Utc>) -> Option<CycleOutput> {
        if !self.enabled {
            debug!("disabled; skipping segment batch");
            return None;
        }

        let dt = match self.last_update {
            Some(last) => crate::secs((now - last - self.paused).max(TimeDelta::zero())),
            None => 0.0,
        };
        self.last_update = Some(now);
        self.paused = TimeDelta::zero();

        let (v, w) = self.motion.current(now).unwrap_or_else(|e| {
            debug!(error = %e, "assuming zero velocity");
            (0.0, 0.0)
        });

        let predicted = self.filter.predict(dt, v, w);
        let range = SensingRange::from(&self.config.observation);
        let updated = self.filter.update(&batch.segments, &range);
        let recovered = predicted.recovered || updated.recovered;

        if recovered {
            self.consecutive_recoveries += 1;
            if self.consecutive_recoveries >= RECOVERY_ALARM_THRESHOLD {
                error!(
                    consecutive = self.consecutive_recoveries,
                    "belief keeps collapsing; check segment orientation and observation noise"
                );
            }
        } else {
            self.consecutive_recoveries = 0;
        }

        let estimate = self.filter.estimate(&self.config.estimate);
        self.history.push(PoseSample {
            d: estimate.d,
            phi: estimate.phi,
        });
        let (curvature_label, curvature) = self.history.classify(&self.config.curvature);

        let belief = self.filter.belief();
        let (d_bins, phi_bins) = belief.shape();
        let out = CycleOutput {
            pose: LanePose {
                stamp: batch.stamp,
                d: estimate.d,
                phi: estimate.phi,
                in_lane: estimate.in_lane && !recovered,
                curvature,
                curvature_label,
                status: if recovered {
                    LaneStatus::Recovered
                } else {
                    LaneStatus::Normal
                },
            },
            image: BeliefImage {
                stamp: batch.stamp,
                width: phi_bins as u32,
                height: d_bins as u32,
                data: belief.to_intensity_image(),
            },
            diagnostics: FilterDiagnostics {
                stamp: batch.stamp,
                entropy: belief.entropy(),
                max_mass: estimate.max_mass,
                retained_segments: updated.retained,
                consecutive_recoveries: self.consecutive_recoveries,
            },
            dt,
        };
        debug!(
            d = out.pose.d,
            phi = out.pose.phi,
            in_lane = out.pose.in_lane,
            retained = updated.retained,
            dt,
            "cycle complete"
        );
        Some(out)
    }

    /// Apply a new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] and keeps the running
    /// filter when `config` is invalid.
    pub fn reconfigure(&mut self, config: LaneFilterConfig) -> Result<Reconfigured, LaneError> {
        config.validate()?;
        let rebuild = config.filter != self.config.filter
            || config.grid != self.config.grid
            || config.prior != self.config.prior;
        let outcome = if rebuild {
            self.filter = LaneFilterImpl::from_config(&config)?;
            self.history.clear();
            self.consecutive_recoveries = 0;
            Reconfigured::Rebuilt
        } else {
            self.filter.retune(&config)?;
            Reconfigured::Retuned
        };
        self.history.set_capacity(config.curvature.history_len);
        self.motion.set_stale_after(config.motion.stale_after_secs);
        self.config = config;
        info!(?outcome, "lane filter reconfigured");
        Ok(outcome)
    }

    /// Route one inbound payload and return the events to publish.
    pub fn handle(&mut self, payload: EventPayload, now: DateTime<Utc>) -> Vec<Event> {
        match payload {
            EventPayload::SegmentList(batch) => self
                .process(&batch, now)
                .map(CycleOutput::into_events)
                .unwrap_or_default(),
            EventPayload::VelocityCommand(cmd) => {
                self.set_velocity(cmd);
                Vec::new()
            }
            EventPayload::Switch { enabled } => {
                self.set_enabled(enabled, now);
                Vec::new()
            }
            EventPayload::Configuration(config) => match self.reconfigure(*config) {
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "rejected configuration; keeping current filter");
                    vec![Event::new(
                        SOURCE,
                        EventPayload::Fault {
                            component: "lane_filter".to_string(),
                            message: e.to_string(),
                        },
                    )]
                }
            },
            other => {
                debug!(topic = ?Topic::of(&other), "ignoring outbound payload");
                Vec::new()
            }
        }
    }

    /// Consume inbound topics from `bus` until it closes.
    ///
    /// Cycles run one at a time on the calling task; each inbound event is
    /// fully handled and its outputs published before the next is read.
    pub async fn run(mut self, bus: Arc<EventBus>) {
        let mut segments = bus.subscribe_to(Topic::SegmentList);
        let mut velocity = bus.subscribe_to(Topic::VelocityCommand);
        let mut switch = bus.subscribe_to(Topic::Switch);
        let mut configuration = bus.subscribe_to(Topic::Configuration);
        info!("lane filter node running");

        loop {
            let received = tokio::select! {
                r = segments.recv() => (Topic::SegmentList, r),
                r = velocity.recv() => (Topic::VelocityCommand, r),
                r = switch.recv() => (Topic::Switch, r),
                r = configuration.recv() => (Topic::Configuration, r),
            };
            match received {
                (_, Ok(event)) => {
                    for out in self.handle(event.payload, Utc::now()) {
                        // Nobody listening on an output topic is normal.
                        let _ = bus.publish(out);
                    }
                }
                (topic, Err(RecvError::Lagged(n))) => {
                    warn!(?topic, lagged_by = n, "node fell behind; dropped messages");
                }
                (topic, Err(RecvError::Closed)) => {
                    info!(?topic, "bus closed; stopping lane filter node");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
