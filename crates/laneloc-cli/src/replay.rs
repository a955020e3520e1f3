//! Offline replay of recorded inbound traffic.
//!
//! Each non-empty line of the input is one inbound [`EventPayload`] as JSON
//! (`{"kind": "segment_list", "data": {...}}`). Lines starting with `#` are
//! comments. The recording's own stamps drive the clock: a segment list is
//! processed at its batch stamp, a velocity command advances the clock to its
//! stamp, and switches and configurations apply at the latest stamp seen.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use laneloc_runtime::{CycleOutput, LaneFilterNode};
use laneloc_types::{EventPayload, LaneError};
use tracing::{debug, warn};

/// Totals for one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: usize,
    pub cycles: usize,
    pub skipped: usize,
    pub recoveries: usize,
}

/// Feed every line of `input` through `node`, calling `on_cycle` for each
/// processed segment batch.
///
/// # Errors
///
/// Returns [`LaneError::Serialization`] naming the line number of the first
/// line that cannot be read or parsed.
pub fn replay(
    input: impl BufRead,
    node: &mut LaneFilterNode,
    mut on_cycle: impl FnMut(&CycleOutput),
) -> Result<ReplayStats, LaneError> {
    let mut stats = ReplayStats::default();
    let mut clock: Option<DateTime<Utc>> = None;

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| LaneError::Serialization(format!("line {line_no}: {e}")))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        stats.lines += 1;

        let payload: EventPayload = serde_json::from_str(trimmed)
            .map_err(|e| LaneError::Serialization(format!("line {line_no}: {e}")))?;

        match payload {
            EventPayload::SegmentList(batch) => {
                clock = Some(batch.stamp);
                match node.process(&batch, batch.stamp) {
                    Some(out) => {
                        stats.cycles += 1;
                        if out.diagnostics.consecutive_recoveries > 0 {
                            stats.recoveries += 1;
                        }
                        on_cycle(&out);
                    }
                    None => stats.skipped += 1,
                }
            }
            EventPayload::VelocityCommand(cmd) => {
                clock = Some(cmd.stamp);
                node.set_velocity(cmd);
            }
            EventPayload::Switch { enabled } => {
                node.set_enabled(enabled, clock.unwrap_or(DateTime::UNIX_EPOCH));
            }
            EventPayload::Configuration(config) => {
                if let Err(e) = node.reconfigure(*config) {
                    warn!(line = line_no, error = %e, "configuration rejected");
                }
            }
            other => {
                debug!(line = line_no, payload = ?other, "ignoring outbound payload");
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneloc_types::LaneFilterConfig;

    const STAMP: &str = "2023-11-14T22:13:20Z";

    fn node() -> LaneFilterNode {
        LaneFilterNode::new(LaneFilterConfig::default()).unwrap()
    }

    fn segment_line(stamp: &str) -> String {
        format!(
            r#"{{"kind":"segment_list","data":{{"stamp":"{stamp}","segments":[{{"points":[{{"x":0.7,"y":-0.115}},{{"x":0.9,"y":-0.115}}],"color":"white"}}]}}}}"#
        )
    }

    #[test]
    fn segment_lines_produce_cycles_stamped_by_the_recording() {
        let input = format!(
            "# recorded drive\n{}\n\n{}\n",
            segment_line(STAMP),
            segment_line("2023-11-14T22:13:20.100Z")
        );
        let mut stamps = Vec::new();
        let stats = replay(input.as_bytes(), &mut node(), |out| {
            stamps.push(out.pose.stamp);
        })
        .unwrap();

        assert_eq!(stats.lines, 2);
        assert_eq!(stats.cycles, 2);
        assert_eq!(stamps[0].timestamp(), 1_700_000_000);
        assert_eq!(stamps[1].timestamp_subsec_millis(), 100);
    }

    #[test]
    fn recording_clock_drives_dt() {
        let input = format!(
            "{}\n{}\n",
            segment_line(STAMP),
            segment_line("2023-11-14T22:13:20.250Z")
        );
        let mut dts = Vec::new();
        replay(input.as_bytes(), &mut node(), |out| dts.push(out.dt)).unwrap();
        assert_eq!(dts[0], 0.0);
        assert!((dts[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn switch_off_skips_batches() {
        let input = format!(
            "{}\n{}\n{}\n",
            segment_line(STAMP),
            r#"{"kind":"switch","data":{"enabled":false}}"#,
            segment_line("2023-11-14T22:13:21Z"),
        );
        let stats = replay(input.as_bytes(), &mut node(), |_| {}).unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn velocity_and_configuration_lines_are_applied() {
        let input = format!(
            "{}\n{}\n",
            r#"{"kind":"velocity_command","data":{"stamp":"2023-11-14T22:13:20Z","v":0.2,"omega":0.0}}"#,
            r#"{"kind":"configuration","data":{"estimate":{"min_max":0.3}}}"#,
        );
        let mut n = node();
        let stats = replay(input.as_bytes(), &mut n, |_| {}).unwrap();
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.cycles, 0);
        assert!((n.config().estimate.min_max - 0.3).abs() < 1e-12);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = format!("{}\nnot json\n", segment_line(STAMP));
        let err = replay(input.as_bytes(), &mut node(), |_| {}).unwrap_err();
        match err {
            LaneError::Serialization(msg) => assert!(msg.starts_with("line 2"), "{msg}"),
            other => panic!("expected Serialization, got {other:?}"),
        }
    }
}
