//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Payload |
//! |---|---|---|
//! | [`Topic::SegmentList`] | in | [`EventPayload::SegmentList`] |
//! | [`Topic::VelocityCommand`] | in | [`EventPayload::VelocityCommand`] |
//! | [`Topic::Switch`] | in | [`EventPayload::Switch`] |
//! | [`Topic::Configuration`] | in | [`EventPayload::Configuration`] |
//! | [`Topic::LanePose`] | out | [`EventPayload::LanePose`] |
//! | [`Topic::InLane`] | out | [`EventPayload::InLane`] |
//! | [`Topic::BeliefImage`] | out | [`EventPayload::BeliefImage`] |
//! | [`Topic::Diagnostics`] | out | [`EventPayload::Diagnostics`] |
//! | [`Topic::Faults`] | out | [`EventPayload::Fault`] |
//!
//! Every event is also mirrored onto a firehose channel
//! ([`EventBus::subscribe_all`]) used by bridges that forward the whole
//! stream.

use laneloc_types::{Event, EventPayload, LaneError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SegmentList,
    VelocityCommand,
    Switch,
    Configuration,
    LanePose,
    InLane,
    BeliefImage,
    Diagnostics,
    Faults,
}

impl Topic {
    /// Topics carrying results produced by the lane filter.
    pub const OUTBOUND: [Topic; 5] = [
        Topic::LanePose,
        Topic::InLane,
        Topic::BeliefImage,
        Topic::Diagnostics,
        Topic::Faults,
    ];

    /// The topic a payload is routed on.
    pub fn of(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::SegmentList(_) => Topic::SegmentList,
            EventPayload::VelocityCommand(_) => Topic::VelocityCommand,
            EventPayload::Switch { .. } => Topic::Switch,
            EventPayload::Configuration(_) => Topic::Configuration,
            EventPayload::LanePose(_) => Topic::LanePose,
            EventPayload::InLane { .. } => Topic::InLane,
            EventPayload::BeliefImage(_) => Topic::BeliefImage,
            EventPayload::Diagnostics(_) => Topic::Diagnostics,
            EventPayload::Fault { .. } => Topic::Faults,
        }
    }

    pub fn is_outbound(self) -> bool {
        Self::OUTBOUND.contains(&self)
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    firehose: broadcast::Sender<Event>,
    segment_list: broadcast::Sender<Event>,
    velocity_command: broadcast::Sender<Event>,
    switch: broadcast::Sender<Event>,
    configuration: broadcast::Sender<Event>,
    lane_pose: broadcast::Sender<Event>,
    in_lane: broadcast::Sender<Event>,
    belief_image: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let channel = || broadcast::channel(capacity).0;
        Self {
            firehose: channel(),
            segment_list: channel(),
            velocity_command: channel(),
            switch: channel(),
            configuration: channel(),
            lane_pose: channel(),
            in_lane: channel(),
            belief_image: channel(),
            diagnostics: channel(),
            faults: channel(),
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of topic subscribers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::Channel`] when nobody is subscribed to `topic`.
    /// The firehose copy is still delivered in that case.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, LaneError> {
        let _ = self.firehose.send(event.clone());
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| LaneError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Publish `event` on the topic its payload belongs to.
    ///
    /// # Errors
    ///
    /// See [`EventBus::publish_to`].
    pub fn publish(&self, event: Event) -> Result<usize, LaneError> {
        let topic = Topic::of(&event.payload);
        trace!(?topic, source = %event.source, "publish");
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event published on any topic.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.firehose.subscribe()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::SegmentList => &self.segment_list,
            Topic::VelocityCommand => &self.velocity_command,
            Topic::Switch => &self.switch,
            Topic::Configuration => &self.configuration,
            Topic::LanePose => &self.lane_pose,
            Topic::InLane => &self.in_lane,
            Topic::BeliefImage => &self.belief_image,
            Topic::Diagnostics => &self.diagnostics,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
