//! # Exit sequence manager
//!
//! Takes a queue of (agent, target pose) assignments and moves the agents out of the enclosure one
//! at a time, in queue order. For each agent the coordinator:
//!
//! 1. Checks the agent can drive straight ahead for the corridor length.
//! 2. Plans an oriented path from the end of the corridor to the target.
//! 3. Hands corridor plus path to the motion scheduler.
//! 4. When the motion finishes, snaps the agent onto its target, marks it parked and launches the
//!    next agent.
//!
//! Any failure halts the whole sequence. Agents already parked stay parked, the rest stay where
//! they are.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Display;

use log::{error, info, warn};
use sandbox_if::{tc::ExitAssignmentSpec, tm::EventTm};

use crate::{
    agent::{Agent, AgentId, AgentStatus},
    geom::{Cell, GridPose},
    motion::{MotionError, MotionScheduler, Waypoint},
    nav::{oriented_astar, NavError, NavParams},
    world::World,
};

pub use params::ExitParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One agent's place in the exit queue.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ExitAssignment {
    pub agent: AgentId,
    pub target: GridPose,

    /// Overrides the configured corridor length for this agent.
    pub corridor_length: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ExitCoordinator {
    params: ExitParams,
    nav_params: NavParams,

    queue: VecDeque<ExitAssignment>,

    /// Assignment of the agent currently moving.
    active: Option<ExitAssignment>,

    /// Events emitted since the last call to `take_events`.
    events: Vec<ExitEvent>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Stage of an agent's exit at which a failure occured.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExitStage {
    Corridor,
    Planning,
    Scheduling,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitEvent {
    Started {
        agent: AgentId,
    },
    Parked {
        agent: AgentId,
    },
    Failed {
        agent: AgentId,
        stage: ExitStage,
        reason: String,
    },
    Complete,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExitSeqError {
    #[error("The exit sequence has no assignments")]
    EmptySequence,

    #[error("An exit sequence is already running")]
    AlreadyRunning,

    #[error("Agent {0} does not exist")]
    UnknownAgent(AgentId),

    #[error("Agent {0} is assigned more than once")]
    DuplicateAgent(AgentId),

    #[error("Corridor of agent {agent} is blocked at {cell}")]
    CorridorBlocked { agent: AgentId, cell: Cell },

    #[error("Could not plan a path for agent {0}: {1}")]
    PlanFailed(AgentId, NavError),

    #[error("Could not schedule the motion of agent {0}: {1}")]
    ScheduleFailed(AgentId, MotionError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ExitCoordinator {
    pub fn new(params: ExitParams, nav_params: NavParams) -> Self {
        Self {
            params,
            nav_params,
            queue: VecDeque::new(),
            active: None,
            events: Vec::new(),
        }
    }

    /// Start a new exit sequence and launch the first agent.
    ///
    /// Every queued agent is marked waiting. If the first agent can't be launched the sequence
    /// halts, a failed event is emitted and the error is returned.
    pub fn start(
        &mut self,
        assignments: Vec<ExitAssignment>,
        world: &mut World,
        agents: &mut BTreeMap<AgentId, Agent>,
        scheduler: &mut MotionScheduler,
    ) -> Result<(), ExitSeqError> {
        if self.is_running() {
            return Err(ExitSeqError::AlreadyRunning);
        }
        if assignments.is_empty() {
            return Err(ExitSeqError::EmptySequence);
        }

        let mut seen = BTreeSet::new();
        for a in assignments.iter() {
            if !agents.contains_key(&a.agent) {
                return Err(ExitSeqError::UnknownAgent(a.agent));
            }
            if !seen.insert(a.agent) {
                return Err(ExitSeqError::DuplicateAgent(a.agent));
            }
        }

        info!(
            "Exit sequence started for agents {:?}",
            assignments.iter().map(|a| a.agent).collect::<Vec<_>>()
        );

        for a in assignments.iter() {
            if let Some(agent) = agents.get_mut(&a.agent) {
                agent.status = AgentStatus::Waiting;
            }
        }

        self.queue = assignments.into();

        self.launch_next(world, agents, scheduler)
    }

    /// Handle the end of the active agent's motion.
    ///
    /// Snaps the agent to its target, marks it parked and launches the next agent. Returns the
    /// error if the next launch fails, after emitting a failed event.
    pub fn on_motion_finished(
        &mut self,
        agent_id: AgentId,
        world: &mut World,
        agents: &mut BTreeMap<AgentId, Agent>,
        scheduler: &mut MotionScheduler,
    ) -> Result<(), ExitSeqError> {
        let active = match self.active {
            Some(a) if a.agent == agent_id => a,
            _ => {
                warn!(
                    "Motion of agent {} finished but it is not the active exit agent",
                    agent_id
                );
                return Ok(());
            }
        };

        self.park(&active, world, agents)?;
        self.active = None;

        self.launch_next(world, agents, scheduler)
    }

    /// Halt the sequence without touching the agents.
    pub fn abort(&mut self) {
        if self.is_running() {
            info!("Exit sequence aborted");
        }

        self.queue.clear();
        self.active = None;
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    /// The agent currently moving, if any.
    pub fn active_agent(&self) -> Option<AgentId> {
        self.active.map(|a| a.agent)
    }

    /// Number of agents still waiting their turn.
    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }

    pub fn take_events(&mut self) -> Vec<ExitEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn params(&self) -> &ExitParams {
        &self.params
    }

    /// Launch agents from the front of the queue until one is moving, the queue is empty, or a
    /// launch fails.
    fn launch_next(
        &mut self,
        world: &mut World,
        agents: &mut BTreeMap<AgentId, Agent>,
        scheduler: &mut MotionScheduler,
    ) -> Result<(), ExitSeqError> {
        while let Some(assignment) = self.queue.pop_front() {
            let waypoints = match self.prepare(&assignment, world, agents) {
                Ok(w) => w,
                Err(e) => return Err(self.fail(assignment.agent, e)),
            };

            // Already at the target with no corridor to drive
            if waypoints.len() < 2 {
                info!("Agent {} is already at its exit target", assignment.agent);
                self.park(&assignment, world, agents)?;
                continue;
            }

            if let Err(e) = scheduler.begin_sequence(assignment.agent, &waypoints) {
                return Err(self.fail(
                    assignment.agent,
                    ExitSeqError::ScheduleFailed(assignment.agent, e),
                ));
            }

            if let Some(agent) = agents.get_mut(&assignment.agent) {
                agent.status = AgentStatus::Moving;
            }

            info!(
                "Agent {} exiting towards {} ({} waypoints)",
                assignment.agent,
                assignment.target,
                waypoints.len()
            );

            self.active = Some(assignment);
            self.events.push(ExitEvent::Started {
                agent: assignment.agent,
            });

            return Ok(());
        }

        info!("Exit sequence complete");
        self.events.push(ExitEvent::Complete);

        Ok(())
    }

    /// Build the full waypoint sequence for an assignment: corridor then planned path.
    fn prepare(
        &self,
        assignment: &ExitAssignment,
        world: &World,
        agents: &BTreeMap<AgentId, Agent>,
    ) -> Result<Vec<Waypoint>, ExitSeqError> {
        let agent = agents
            .get(&assignment.agent)
            .ok_or(ExitSeqError::UnknownAgent(assignment.agent))?;

        let corridor_length = assignment
            .corridor_length
            .unwrap_or(self.params.corridor_length);

        let view = world.view(Some(agent.id), agent.width, agent.height);

        // Corridor check
        let start = agent.grid_pose();
        let (dx, dy) = start.orientation.step();
        let mut poses = vec![start];

        for i in 1..=corridor_length as i32 {
            let pose = GridPose {
                cell: start.cell.offset(dx * i, dy * i),
                orientation: start.orientation,
            };

            if !view.is_pose_free(&pose) {
                return Err(ExitSeqError::CorridorBlocked {
                    agent: agent.id,
                    cell: pose.cell,
                });
            }

            poses.push(pose);
        }

        // Plan from the corridor end
        let corridor_end = *poses.last().unwrap_or(&start);
        let planned = oriented_astar::plan(&view, corridor_end, assignment.target, &self.nav_params)
            .map_err(|e| ExitSeqError::PlanFailed(agent.id, e))?;

        poses.extend(planned.into_iter().skip(1));

        // The agent may not be exactly on its cell, start from where it really is
        let mut waypoints: Vec<Waypoint> = poses.iter().map(Waypoint::from_pose).collect();
        if let Some(first) = waypoints.first_mut() {
            first.position = agent.position;
            first.heading_deg = agent.heading_deg;
        }

        Ok(waypoints)
    }

    fn park(
        &mut self,
        assignment: &ExitAssignment,
        world: &mut World,
        agents: &mut BTreeMap<AgentId, Agent>,
    ) -> Result<(), ExitSeqError> {
        let agent = agents
            .get_mut(&assignment.agent)
            .ok_or(ExitSeqError::UnknownAgent(assignment.agent))?;

        agent.snap_to(assignment.target);
        agent.status = AgentStatus::Parked;

        if let Err(e) = world.move_agent(agent.id, agent.tracked()) {
            warn!("Parked agent {} is not tracked by the world: {}", agent.id, e);
        }

        info!("Agent {} parked at {}", agent.id, assignment.target);
        self.events.push(ExitEvent::Parked { agent: agent.id });

        Ok(())
    }

    /// Halt the sequence on an error, emitting the failed event.
    fn fail(&mut self, agent: AgentId, e: ExitSeqError) -> ExitSeqError {
        error!("Exit sequence halted at agent {}: {}", agent, e);

        self.events.push(ExitEvent::Failed {
            agent,
            stage: e.stage().unwrap_or(ExitStage::Planning),
            reason: format!("{}", e),
        });

        self.queue.clear();
        self.active = None;

        e
    }
}

impl ExitSeqError {
    /// The stage of an agent's exit this error belongs to, if it belongs to one.
    pub fn stage(&self) -> Option<ExitStage> {
        match self {
            ExitSeqError::CorridorBlocked { .. } => Some(ExitStage::Corridor),
            ExitSeqError::PlanFailed(..) => Some(ExitStage::Planning),
            ExitSeqError::ScheduleFailed(..) => Some(ExitStage::Scheduling),
            _ => None,
        }
    }
}

impl Display for ExitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStage::Corridor => write!(f, "corridor"),
            ExitStage::Planning => write!(f, "planning"),
            ExitStage::Scheduling => write!(f, "scheduling"),
        }
    }
}

impl From<ExitAssignmentSpec> for ExitAssignment {
    fn from(a: ExitAssignmentSpec) -> Self {
        Self {
            agent: a.agent,
            target: a.target.into(),
            corridor_length: a.corridor_length,
        }
    }
}

impl From<ExitEvent> for EventTm {
    fn from(e: ExitEvent) -> Self {
        match e {
            ExitEvent::Started { agent } => EventTm::ExitStarted { agent },
            ExitEvent::Parked { agent } => EventTm::ExitParked { agent },
            ExitEvent::Failed {
                agent,
                stage,
                reason,
            } => EventTm::ExitFailed {
                agent,
                stage: stage.to_string(),
                reason,
            },
            ExitEvent::Complete => EventTm::ExitComplete,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{geom::Orientation, motion::MotionParams};

    struct Fixture {
        world: World,
        agents: BTreeMap<AgentId, Agent>,
        scheduler: MotionScheduler,
        coord: ExitCoordinator,
    }

    fn fixture(poses: &[(AgentId, GridPose)]) -> Fixture {
        let mut world = World::new(10, 10).unwrap();
        let mut agents = BTreeMap::new();

        for (id, pose) in poses {
            let agent = Agent::new(*id, *pose, 1, 1);
            world.track_agent(*id, agent.tracked());
            agents.insert(*id, agent);
        }

        Fixture {
            world,
            agents,
            scheduler: MotionScheduler::new(MotionParams::default()).unwrap(),
            coord: ExitCoordinator::new(ExitParams::default(), NavParams::default()),
        }
    }

    #[test]
    fn test_corridor_blocked_halts_sequence() {
        // Agent 2 sits directly in front of agent 1
        let mut f = fixture(&[
            (1, GridPose::new(4, 8, Orientation::North)),
            (2, GridPose::new(4, 7, Orientation::North)),
        ]);

        let result = f.coord.start(
            vec![
                ExitAssignment {
                    agent: 1,
                    target: GridPose::new(1, 1, Orientation::North),
                    corridor_length: None,
                },
                ExitAssignment {
                    agent: 2,
                    target: GridPose::new(5, 1, Orientation::North),
                    corridor_length: None,
                },
            ],
            &mut f.world,
            &mut f.agents,
            &mut f.scheduler,
        );

        assert_eq!(
            result,
            Err(ExitSeqError::CorridorBlocked {
                agent: 1,
                cell: Cell::new(4, 7)
            })
        );
        assert!(!f.coord.is_running());
        assert!(!f.scheduler.is_executing());

        let events = f.coord.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ExitEvent::Failed {
                agent: 1,
                stage: ExitStage::Corridor,
                ..
            }
        ));

        // Nothing moved
        assert_eq!(f.agents[&1].grid_pose(), GridPose::new(4, 8, Orientation::North));
        assert_eq!(f.agents[&2].status, AgentStatus::Waiting);
    }

    #[test]
    fn test_launch_and_handover() {
        let mut f = fixture(&[
            (1, GridPose::new(2, 8, Orientation::North)),
            (2, GridPose::new(6, 8, Orientation::North)),
        ]);

        f.coord
            .start(
                vec![
                    ExitAssignment {
                        agent: 1,
                        target: GridPose::new(2, 1, Orientation::East),
                        corridor_length: Some(3),
                    },
                    ExitAssignment {
                        agent: 2,
                        target: GridPose::new(6, 1, Orientation::North),
                        corridor_length: None,
                    },
                ],
                &mut f.world,
                &mut f.agents,
                &mut f.scheduler,
            )
            .unwrap();

        assert_eq!(f.coord.active_agent(), Some(1));
        assert_eq!(f.coord.num_queued(), 1);
        assert_eq!(f.scheduler.agent(), Some(1));
        assert_eq!(f.agents[&1].status, AgentStatus::Moving);
        assert_eq!(f.agents[&2].status, AgentStatus::Waiting);

        // The first three segments are the straight corridor
        for seg in f.scheduler.segments().iter().take(3) {
            assert!(seg.translates);
            assert_eq!(seg.start.orientation, Orientation::North);
            assert_eq!(seg.end.position.y, seg.start.position.y - 1.0);
        }

        assert_eq!(f.coord.take_events(), vec![ExitEvent::Started { agent: 1 }]);

        f.coord
            .on_motion_finished(1, &mut f.world, &mut f.agents, &mut f.scheduler)
            .unwrap();

        assert_eq!(f.agents[&1].status, AgentStatus::Parked);
        assert_eq!(f.agents[&1].grid_pose(), GridPose::new(2, 1, Orientation::East));
        assert_eq!(f.agents[&1].heading_deg, 90.0);
        assert_eq!(f.coord.active_agent(), Some(2));
        assert_eq!(
            f.coord.take_events(),
            vec![ExitEvent::Parked { agent: 1 }, ExitEvent::Started { agent: 2 }]
        );

        f.coord
            .on_motion_finished(2, &mut f.world, &mut f.agents, &mut f.scheduler)
            .unwrap();
        assert!(!f.coord.is_running());
        assert_eq!(
            f.coord.take_events(),
            vec![ExitEvent::Parked { agent: 2 }, ExitEvent::Complete]
        );
    }

    #[test]
    fn test_validation() {
        let mut f = fixture(&[(1, GridPose::new(2, 8, Orientation::North))]);
        let target = GridPose::new(2, 1, Orientation::North);

        assert_eq!(
            f.coord
                .start(vec![], &mut f.world, &mut f.agents, &mut f.scheduler),
            Err(ExitSeqError::EmptySequence)
        );

        let unknown = vec![ExitAssignment {
            agent: 9,
            target,
            corridor_length: None,
        }];
        assert_eq!(
            f.coord
                .start(unknown, &mut f.world, &mut f.agents, &mut f.scheduler),
            Err(ExitSeqError::UnknownAgent(9))
        );

        let dup = vec![
            ExitAssignment {
                agent: 1,
                target,
                corridor_length: None,
            };
            2
        ];
        assert_eq!(
            f.coord
                .start(dup, &mut f.world, &mut f.agents, &mut f.scheduler),
            Err(ExitSeqError::DuplicateAgent(1))
        );

        // Target occupied by a wall
        f.world.set_obstacles(&[Cell::new(2, 1)]).unwrap();
        let blocked = vec![ExitAssignment {
            agent: 1,
            target,
            corridor_length: None,
        }];
        assert!(matches!(
            f.coord
                .start(blocked, &mut f.world, &mut f.agents, &mut f.scheduler),
            Err(ExitSeqError::PlanFailed(1, NavError::InvalidRequest(_)))
        ));
        assert!(matches!(
            f.coord.take_events()[..],
            [ExitEvent::Failed {
                stage: ExitStage::Planning,
                ..
            }]
        ));
    }
}
