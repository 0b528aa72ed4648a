//! Motion scheduler state

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use serde::Serialize;

use super::{build_segments, MotionError, MotionParams, MotionSegment, Waypoint};
use crate::agent::AgentId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MotionScheduler {
    params: MotionParams,

    /// Executing mode
    mode: MotionMode,

    /// The agent the loaded sequence belongs to.
    agent: Option<AgentId>,

    segments: Vec<MotionSegment>,

    /// Index of the executing segment
    segment_index: usize,

    /// Time spent in the executing segment
    segment_elapsed_s: f64,

    report: StatusReport,
}

/// Pose of the driven agent at the end of a tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MotionSample {
    pub agent: AgentId,
    pub pose: Waypoint,
}

/// The status report of one call to [`MotionScheduler::proc`].
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// Index of the segment being executed at the end of the tick.
    pub segment_index: usize,

    /// Segments not yet completed, including the executing one.
    pub segments_remaining: usize,

    /// Fraction of the total sequence duration completed.
    pub progress: f64,

    /// True on the tick the sequence finished.
    pub finished: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The possible modes of execution of the scheduler. Each mode is handled by a `mode_xyz`
/// function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MotionMode {
    Off,
    Executing,
    SequenceFinished,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionScheduler {
    pub fn new(params: MotionParams) -> Result<Self, MotionError> {
        params.validate()?;

        Ok(Self {
            params,
            mode: MotionMode::Off,
            agent: None,
            segments: Vec::new(),
            segment_index: 0,
            segment_elapsed_s: 0.0,
            report: StatusReport::default(),
        })
    }

    /// Advance the scheduler by `dt_s` seconds.
    ///
    /// Returns the driven agent's pose at the end of the tick, if a sequence is loaded, and the
    /// status report.
    pub fn proc(
        &mut self,
        dt_s: f64,
    ) -> Result<(Option<MotionSample>, StatusReport), MotionError> {
        self.report = StatusReport::default();

        let sample = match self.mode {
            MotionMode::Off => self.mode_off(),
            MotionMode::Executing => self.mode_executing(dt_s),
            MotionMode::SequenceFinished => self.mode_seq_finished(),
        }?;

        Ok((sample, self.report))
    }

    /// Load a new sequence for the given agent built from consecutive waypoints.
    ///
    /// Any sequence already executing is discarded immediately, with the agent left wherever the
    /// last tick put it.
    pub fn begin_sequence(
        &mut self,
        agent: AgentId,
        waypoints: &[Waypoint],
    ) -> Result<(), MotionError> {
        let segments = build_segments(waypoints, &self.params);
        if segments.is_empty() {
            return Err(MotionError::AttemptEmptySeqLoad);
        }

        if self.mode == MotionMode::Executing {
            debug!(
                "Replacing motion sequence of agent {:?} with {} new segments",
                self.agent,
                segments.len()
            );
        }

        info!(
            "Motion sequence of {} segments loaded for agent {} ({:.2} s)",
            segments.len(),
            agent,
            segments.iter().map(|s| s.duration_s).sum::<f64>()
        );

        self.agent = Some(agent);
        self.segments = segments;
        self.segment_index = 0;
        self.segment_elapsed_s = 0.0;
        self.mode = MotionMode::Executing;

        Ok(())
    }

    /// Stop executing immediately.
    pub fn abort(&mut self) {
        if self.mode == MotionMode::Executing {
            info!("Motion of agent {:?} aborted", self.agent);
        }

        self.clear();
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn is_executing(&self) -> bool {
        self.mode == MotionMode::Executing
    }

    /// The agent being driven, if any.
    pub fn agent(&self) -> Option<AgentId> {
        self.agent
    }

    /// The segment being executed, if any.
    pub fn active_segment(&self) -> Option<&MotionSegment> {
        match self.mode {
            MotionMode::Executing => self.segments.get(self.segment_index),
            _ => None,
        }
    }

    pub fn segments(&self) -> &[MotionSegment] {
        &self.segments
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    fn clear(&mut self) {
        self.mode = MotionMode::Off;
        self.agent = None;
        self.segments.clear();
        self.segment_index = 0;
        self.segment_elapsed_s = 0.0;
    }

    fn mode_off(&mut self) -> Result<Option<MotionSample>, MotionError> {
        Ok(None)
    }

    fn mode_executing(&mut self, dt_s: f64) -> Result<Option<MotionSample>, MotionError> {
        let agent = match self.agent {
            Some(a) => a,
            None => {
                self.clear();
                return Ok(None);
            }
        };

        let mut remaining_s = dt_s.max(0.0);

        let pose = loop {
            let seg = self
                .segments
                .get(self.segment_index)
                .ok_or(MotionError::NoSegment(self.segment_index))?;

            let left_s = seg.duration_s - self.segment_elapsed_s;

            if remaining_s < left_s {
                self.segment_elapsed_s += remaining_s;
                break seg.sample(self.segment_elapsed_s);
            }

            // Segment completed this tick, carry the surplus into the next one
            remaining_s -= left_s;
            self.segment_index += 1;
            self.segment_elapsed_s = 0.0;

            if self.segment_index >= self.segments.len() {
                self.mode = MotionMode::SequenceFinished;
                self.report.finished = true;
                break seg.end;
            }
        };

        self.fill_report();

        Ok(Some(MotionSample { agent, pose }))
    }

    fn mode_seq_finished(&mut self) -> Result<Option<MotionSample>, MotionError> {
        debug!("Motion sequence of agent {:?} finished", self.agent);
        self.clear();
        Ok(None)
    }

    fn fill_report(&mut self) {
        let total_s: f64 = self.segments.iter().map(|s| s.duration_s).sum();
        let done_s: f64 = self
            .segments
            .iter()
            .take(self.segment_index)
            .map(|s| s.duration_s)
            .sum::<f64>()
            + self.segment_elapsed_s;

        self.report.segment_index = self.segment_index.min(self.segments.len().saturating_sub(1));
        self.report.segments_remaining = self.segments.len().saturating_sub(self.segment_index);
        self.report.progress = if total_s > 0.0 {
            (done_s / total_s).min(1.0)
        } else {
            1.0
        };
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::{GridPose, Orientation};

    fn params() -> MotionParams {
        MotionParams {
            linear_speed_cells_s: 1.0,
            angular_speed_deg_s: 90.0,
            min_segment_duration_s: 0.1,
        }
    }

    fn straight_line(n: i32) -> Vec<Waypoint> {
        (0..=n)
            .map(|x| Waypoint::from_pose(&GridPose::new(x, 0, Orientation::East)))
            .collect()
    }

    #[test]
    fn test_surplus_carries_over() {
        let mut sched = MotionScheduler::new(params()).unwrap();
        sched.begin_sequence(7, &straight_line(3)).unwrap();

        // 1.25 s crosses the first segment boundary, the extra quarter lands in the second
        let (sample, report) = sched.proc(1.25).unwrap();
        let sample = sample.unwrap();
        assert_eq!(sample.agent, 7);
        assert!((sample.pose.position.x - 1.25).abs() < 1e-9);
        assert_eq!(report.segment_index, 1);
        assert_eq!(report.segments_remaining, 2);
        assert!(!report.finished);

        // A single long tick runs off the end and reports the final pose
        let (sample, report) = sched.proc(10.0).unwrap();
        assert_eq!(sample.unwrap().pose.position.x, 3.0);
        assert!(report.finished);
        assert_eq!(sched.mode(), MotionMode::SequenceFinished);

        // Next tick returns to off
        let (sample, _) = sched.proc(0.1).unwrap();
        assert!(sample.is_none());
        assert_eq!(sched.mode(), MotionMode::Off);
        assert_eq!(sched.agent(), None);
    }

    #[test]
    fn test_replacing_sequence() {
        let mut sched = MotionScheduler::new(params()).unwrap();
        sched.begin_sequence(1, &straight_line(5)).unwrap();
        sched.proc(2.5).unwrap();

        let from = Waypoint {
            position: nalgebra::Point2::new(2.5, 0.0),
            heading_deg: 90.0,
            orientation: Orientation::East,
        };
        let to = Waypoint::from_pose(&GridPose::new(2, 0, Orientation::East));
        sched.begin_sequence(1, &[from, to]).unwrap();

        let (sample, report) = sched.proc(0.25).unwrap();
        assert!((sample.unwrap().pose.position.x - 2.25).abs() < 1e-9);
        assert_eq!(report.segments_remaining, 1);
    }

    #[test]
    fn test_empty_and_abort() {
        let mut sched = MotionScheduler::new(params()).unwrap();

        assert_eq!(
            sched.begin_sequence(1, &straight_line(0)),
            Err(MotionError::AttemptEmptySeqLoad)
        );

        sched.begin_sequence(1, &straight_line(2)).unwrap();
        sched.abort();
        assert_eq!(sched.mode(), MotionMode::Off);
        assert!(sched.proc(1.0).unwrap().0.is_none());

        assert!(MotionScheduler::new(MotionParams {
            linear_speed_cells_s: 0.0,
            ..params()
        })
        .is_err());
    }
}
