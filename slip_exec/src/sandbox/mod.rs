//! # Sandbox
//!
//! The sandbox owns the world, the agents, the single motion scheduler, the click-to-move planner
//! and the exit coordinator. Every edit, planning request and gesture from the input layer goes
//! through it, and the display layer reads the agent snapshots it returns from each tick.
//!
//! Only one agent moves at a time. Starting a new drive or an exit sequence cancels whatever motion
//! was executing, leaving the cancelled agent where the last tick put it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod interaction;
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use nalgebra::Point2;
use sandbox_if::tm::{EventTm, TickTm};
use serde::Serialize;
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    session::Session,
};

use crate::{
    agent::{Agent, AgentId, AgentStatus},
    exit_mgr::{ExitAssignment, ExitCoordinator, ExitEvent, ExitSeqError},
    geom::{Area, Cell, GridPose, RotatedRect},
    motion::{self, MotionError, MotionScheduler, Waypoint},
    nav::{oriented_astar, DStarLite, GridPath, NavError, OrientedPath},
    world::{ObstacleId, World, WorldError},
};

pub use interaction::{Gesture, Interaction, InteractionError};
pub use params::{SandboxParams, WorldParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Sandbox {
    params: SandboxParams,

    world: World,

    agents: BTreeMap<AgentId, Agent>,

    scheduler: MotionScheduler,

    /// The click-to-move planner, kept between a plan and its replans.
    drive: Option<Drive>,

    exit: ExitCoordinator,

    interaction: Interaction,

    sim_time_s: f64,

    /// Events raised outside of a tick, reported by the next one.
    pending_events: Vec<SandboxEvent>,

    arch_agents: Archiver,
}

/// A stored D*-Lite search for one agent.
struct Drive {
    agent: AgentId,
    planner: DStarLite,
    path: GridPath,
}

/// Output of one sandbox tick.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub sim_time_s: f64,

    /// Snapshot of every agent at the end of the tick, in id order.
    pub agents: Vec<Agent>,

    /// Events raised since the previous tick.
    pub events: Vec<SandboxEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxStatus {
    pub motion: motion::StatusReport,
    pub driving: Option<AgentId>,
    pub exit_active_agent: Option<AgentId>,
    pub exit_num_queued: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxEvent {
    DriveFinished { agent: AgentId },
    Exit(ExitEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("World error: {0}")]
    World(#[from] WorldError),

    #[error("Planning error: {0}")]
    Nav(#[from] NavError),

    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    #[error("Exit sequence error: {0}")]
    Exit(#[from] ExitSeqError),

    #[error("Interaction error: {0}")]
    Interaction(#[from] InteractionError),

    #[error("Agent {0} does not exist")]
    UnknownAgent(AgentId),

    #[error("Agent {0} already exists")]
    DuplicateAgent(AgentId),

    #[error("Agent size {0}x{1} is invalid")]
    InvalidAgentSize(u32, u32),

    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("No path has been planned yet")]
    NoActivePlan,

    #[error("Tick duration {0} is invalid")]
    InvalidTick(f64),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Sandbox {
    pub fn new(params: SandboxParams) -> Result<Self, SandboxError> {
        let world = World::new(params.world.width, params.world.height)?;
        let scheduler = MotionScheduler::new(params.motion)?;
        let exit = ExitCoordinator::new(params.exit, params.nav);

        Ok(Self {
            params,
            world,
            agents: BTreeMap::new(),
            scheduler,
            drive: None,
            exit,
            interaction: Interaction::Idle,
            sim_time_s: 0.0,
            pending_events: Vec::new(),
            arch_agents: Archiver::default(),
        })
    }

    // ---- WORLD EDITS ----

    /// Resize the world and set its allowed area.
    ///
    /// Obstacles are cleared, agents are kept. Any motion or exit sequence is cancelled and the
    /// stored click-to-move plan is dropped. Returns the cells blocked in the new world.
    pub fn configure_world(
        &mut self,
        width: u32,
        height: u32,
        allowed_area: Option<Area>,
    ) -> Result<Vec<Cell>, SandboxError> {
        let blocked = self.world.configure(width, height, allowed_area)?;

        self.cancel_activity();
        self.drive = None;

        for agent in self.agents.values() {
            let pose = agent.grid_pose();
            if !self
                .world
                .footprint_free(pose.cell, pose.orientation, agent.width, agent.height, Some(agent.id))
            {
                warn!("Agent {} at {} is not free in the reconfigured world", agent.id, pose);
            }
        }

        Ok(blocked)
    }

    /// Replace the static single-cell obstacles, returning the changed cells.
    pub fn set_obstacles(&mut self, cells: &[Cell]) -> Result<Vec<Cell>, SandboxError> {
        Ok(self.world.set_obstacles(cells)?)
    }

    /// Add an obstacle rectangle, which must not overlap anything already in the world.
    pub fn add_obstacle_rect(
        &mut self,
        rect: RotatedRect,
    ) -> Result<(ObstacleId, Vec<Cell>), SandboxError> {
        if !self.world.is_placement_valid(&rect, None) {
            warn!("Obstacle rect {:?} rejected", rect);
            return Err(SandboxError::InvalidPlacement(format!(
                "obstacle rect centred at ({:.2}, {:.2})",
                rect.centre.x, rect.centre.y
            )));
        }

        Ok(self.world.add_obstacle_rect(rect))
    }

    pub fn remove_obstacle_rect(&mut self, id: ObstacleId) -> Result<Vec<Cell>, SandboxError> {
        Ok(self.world.remove_obstacle_rect(id)?)
    }

    /// Add a new agent resting at `pose`.
    pub fn add_agent(
        &mut self,
        id: AgentId,
        pose: GridPose,
        width: u32,
        height: u32,
    ) -> Result<(), SandboxError> {
        if self.agents.contains_key(&id) {
            return Err(SandboxError::DuplicateAgent(id));
        }
        if width == 0 || height == 0 {
            return Err(SandboxError::InvalidAgentSize(width, height));
        }
        if !self.world.in_bounds(&pose.cell) {
            warn!("Agent {} origin {} is outside the world", id, pose.cell);
            return Err(SandboxError::InvalidPlacement(format!("agent {} at {}", id, pose)));
        }

        let agent = Agent::new(id, pose, width, height);
        if !self.is_agent_placeable(&agent) {
            warn!("Agent {} cannot be placed at {}", id, pose);
            return Err(SandboxError::InvalidPlacement(format!("agent {} at {}", id, pose)));
        }

        info!("Agent {} ({}x{}) added at {}", id, width, height, pose);

        self.world.track_agent(id, agent.tracked());
        self.agents.insert(id, agent);

        Ok(())
    }

    pub fn is_placement_valid(&self, rect: &RotatedRect, exclude: Option<AgentId>) -> bool {
        self.world.is_placement_valid(rect, exclude)
    }

    // ---- PLANNING ----

    /// Plan a D*-Lite path for the agent from its current cell to `goal`, keeping its orientation.
    ///
    /// A driving agent plans from the cell it is heading to. The planner is stored so that later
    /// edits can be repaired with [`Sandbox::replan`].
    pub fn plan_path(&mut self, agent_id: AgentId, goal: Cell) -> Result<GridPath, SandboxError> {
        let agent = self
            .agents
            .get(&agent_id)
            .ok_or(SandboxError::UnknownAgent(agent_id))?;

        let view = self.world.view(Some(agent_id), agent.width, agent.height);
        let mut planner = DStarLite::new(self.params.nav);
        let path = planner.plan(&view, self.search_start(agent), goal, agent.orientation)?;

        self.drive = Some(Drive {
            agent: agent_id,
            planner,
            path: path.clone(),
        });

        Ok(path)
    }

    /// Repair the stored plan after the cells in `edited` changed.
    ///
    /// The search restarts from the agent's current cell, or the cell it is heading to if it is
    /// driving. A driving agent's motion is rescheduled onto the repaired path.
    pub fn replan(&mut self, edited: &[Cell]) -> Result<GridPath, SandboxError> {
        let agent_id = self
            .drive
            .as_ref()
            .ok_or(SandboxError::NoActivePlan)?
            .agent;
        let agent = self
            .agents
            .get(&agent_id)
            .ok_or(SandboxError::UnknownAgent(agent_id))?;
        let start = self.search_start(agent);

        let drive = self.drive.as_mut().ok_or(SandboxError::NoActivePlan)?;
        let view = self.world.view(Some(agent.id), agent.width, agent.height);
        drive.planner.move_start(start);
        let path = drive.planner.replan(&view, edited)?;
        drive.path = path.clone();

        if self.interaction == (Interaction::Driving { agent: agent_id }) {
            debug!("Rescheduling drive of agent {} onto the repaired path", agent_id);
            self.schedule_drive(agent_id, &path)?;
        }

        Ok(path)
    }

    /// Plan a path to `goal` and start driving the agent along it.
    pub fn drive_to(&mut self, agent_id: AgentId, goal: Cell) -> Result<GridPath, SandboxError> {
        match self.interaction {
            Interaction::Idle | Interaction::Driving { .. } => (),
            mode => {
                return Err(InteractionError::Busy {
                    mode,
                    gesture: "click_target",
                }
                .into())
            }
        }

        let path = self.plan_path(agent_id, goal)?;

        self.cancel_drive();
        self.schedule_drive(agent_id, &path)?;

        Ok(path)
    }

    /// Plan an orientation-aware path for the agent, treating every other agent as an obstacle.
    pub fn plan_oriented_path(
        &self,
        agent_id: AgentId,
        start: GridPose,
        goal: GridPose,
    ) -> Result<OrientedPath, SandboxError> {
        let agent = self
            .agents
            .get(&agent_id)
            .ok_or(SandboxError::UnknownAgent(agent_id))?;

        let view = self.world.view(Some(agent_id), agent.width, agent.height);

        Ok(oriented_astar::plan(&view, start, goal, &self.params.nav)?)
    }

    // ---- EXIT SEQUENCE ----

    /// Start moving the assigned agents out one by one.
    ///
    /// Progress is reported through the events of later ticks.
    pub fn run_exit_sequence(
        &mut self,
        assignments: Vec<ExitAssignment>,
    ) -> Result<(), SandboxError> {
        if let Interaction::Dragging { .. } = self.interaction {
            return Err(InteractionError::Busy {
                mode: self.interaction,
                gesture: "run_exit_sequence",
            }
            .into());
        }

        if !self.exit.is_running() {
            self.cancel_drive();
        }

        match self.exit.start(
            assignments,
            &mut self.world,
            &mut self.agents,
            &mut self.scheduler,
        ) {
            Ok(()) => {
                self.interaction = Interaction::Sequencing;
                Ok(())
            }
            Err(e) => {
                if !self.exit.is_running() && self.interaction == Interaction::Sequencing {
                    self.interaction = Interaction::Idle;
                }
                Err(e.into())
            }
        }
    }

    // ---- GESTURES ----

    pub fn handle_gesture(&mut self, gesture: Gesture) -> Result<(), SandboxError> {
        if let Err(e) = self.interaction.check(&gesture) {
            warn!("{}", e);
            return Err(e.into());
        }

        match gesture {
            Gesture::Place {
                agent,
                pose,
                width,
                height,
            } => {
                if self.agents.contains_key(&agent) {
                    if self.interaction == (Interaction::Driving { agent }) {
                        self.cancel_drive();
                    }
                    self.relocate(agent, pose, Some((width, height)))
                } else {
                    self.add_agent(agent, pose, width, height)
                }
            }
            Gesture::BeginDrag { agent } => {
                let from = self
                    .agents
                    .get(&agent)
                    .ok_or(SandboxError::UnknownAgent(agent))?
                    .grid_pose();

                self.interaction = Interaction::Dragging { agent, from };
                Ok(())
            }
            Gesture::DragTo { cell } => {
                if let Interaction::Dragging { agent, .. } = self.interaction {
                    let orientation = self
                        .agents
                        .get(&agent)
                        .ok_or(SandboxError::UnknownAgent(agent))?
                        .orientation;

                    self.relocate(agent, GridPose { cell, orientation }, None)?;
                }
                Ok(())
            }
            Gesture::EndDrag => {
                if let Interaction::Dragging { agent, from } = self.interaction {
                    debug!("Drag of agent {} from {} ended", agent, from);
                }
                self.interaction = Interaction::Idle;
                Ok(())
            }
            Gesture::Rotate { agent } => {
                let pose = self
                    .agents
                    .get(&agent)
                    .ok_or(SandboxError::UnknownAgent(agent))?
                    .grid_pose();

                self.relocate(
                    agent,
                    GridPose {
                        cell: pose.cell,
                        orientation: pose.orientation.next(),
                    },
                    None,
                )
            }
            Gesture::ClickTarget { agent, cell } => self.drive_to(agent, cell).map(|_| ()),
        }
    }

    /// Cancel all activity and remove every agent and obstacle. The world keeps its size.
    pub fn reset(&mut self) {
        self.cancel_activity();
        self.drive = None;

        self.agents.clear();
        self.world.untrack_all_agents();
        self.world.clear_obstacles();
        self.pending_events.clear();

        info!("Sandbox reset");
    }

    // ---- TICK ----

    /// Advance the sandbox by `dt_s` seconds.
    ///
    /// Errors raised inside the tick are logged and cancel the current activity, they are never
    /// returned.
    pub fn tick(&mut self, dt_s: f64) -> TickOutput {
        match self.proc(&dt_s) {
            Ok((output, _)) => output,
            Err(e) => {
                error!("Sandbox tick failed: {}", e);
                self.cancel_activity();

                let mut events = std::mem::take(&mut self.pending_events);
                events.extend(self.exit.take_events().into_iter().map(SandboxEvent::Exit));

                self.snapshot(events)
            }
        }
    }

    // ---- ACCESSORS ----

    pub fn params(&self) -> &SandboxParams {
        &self.params
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn agents(&self) -> &BTreeMap<AgentId, Agent> {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn sim_time_s(&self) -> f64 {
        self.sim_time_s
    }

    /// The most recent click-to-move path, if any.
    pub fn drive_path(&self) -> Option<&[Cell]> {
        self.drive.as_ref().map(|d| d.path.as_slice())
    }

    /// True if nothing is moving and no exit sequence is running.
    pub fn is_idle(&self) -> bool {
        !self.scheduler.is_executing() && !self.exit.is_running()
    }

    // ---- PRIVATE ----

    /// The cell a drive search for the agent starts from.
    ///
    /// Mid-segment this is the end cell of the segment being driven, so a new plan carries on
    /// forwards instead of returning to the nearest cell. It falls back to the nearest cell if the
    /// segment end is no longer free.
    fn search_start(&self, agent: &Agent) -> Cell {
        let heading_to = match self.scheduler.active_segment() {
            Some(seg) if self.scheduler.agent() == Some(agent.id) && seg.translates => {
                Cell::nearest(&seg.end.position)
            }
            _ => return agent.cell(),
        };

        if self.world.footprint_free(
            heading_to,
            agent.orientation,
            agent.width,
            agent.height,
            Some(agent.id),
        ) {
            heading_to
        } else {
            agent.cell()
        }
    }

    /// Returns true if the agent's footprint and rectangle are free of everything else.
    fn is_agent_placeable(&self, agent: &Agent) -> bool {
        let pose = agent.grid_pose();

        self.world
            .footprint_free(pose.cell, pose.orientation, agent.width, agent.height, Some(agent.id))
            && self.world.is_placement_valid(&agent.rect(), Some(agent.id))
    }

    /// Move an existing agent to a new pose (and optionally size), or reject the move.
    fn relocate(
        &mut self,
        id: AgentId,
        pose: GridPose,
        size: Option<(u32, u32)>,
    ) -> Result<(), SandboxError> {
        let current = self.agents.get(&id).ok_or(SandboxError::UnknownAgent(id))?;
        let (width, height) = size.unwrap_or((current.width, current.height));
        if width == 0 || height == 0 {
            return Err(SandboxError::InvalidAgentSize(width, height));
        }
        if !self.world.in_bounds(&pose.cell) {
            warn!("Agent {} origin {} is outside the world", id, pose.cell);
            return Err(InteractionError::PlacementRejected { agent: id, pose }.into());
        }

        let candidate = Agent::new(id, pose, width, height);
        if !self.is_agent_placeable(&candidate) {
            warn!("Agent {} cannot be moved to {}", id, pose);
            return Err(InteractionError::PlacementRejected { agent: id, pose }.into());
        }

        debug!("Agent {} moved to {}", id, pose);

        self.world.move_agent(id, candidate.tracked())?;
        self.agents.insert(id, candidate);

        Ok(())
    }

    /// Load a motion sequence taking the agent from where it is along the path.
    fn schedule_drive(&mut self, agent_id: AgentId, path: &[Cell]) -> Result<(), SandboxError> {
        let agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or(SandboxError::UnknownAgent(agent_id))?;

        let waypoints = drive_waypoints(agent, path);

        if waypoints.len() < 2 {
            info!("Agent {} is already at its drive goal", agent_id);

            if self.scheduler.agent() == Some(agent_id) {
                self.scheduler.abort();
            }
            let pose = agent.grid_pose();
            agent.snap_to(pose);
            agent.status = AgentStatus::Waiting;
            self.world.move_agent(agent_id, agent.tracked())?;

            self.interaction = Interaction::Idle;
            self.pending_events
                .push(SandboxEvent::DriveFinished { agent: agent_id });

            return Ok(());
        }

        self.scheduler.begin_sequence(agent_id, &waypoints)?;
        agent.status = AgentStatus::Moving;
        self.interaction = Interaction::Driving { agent: agent_id };

        Ok(())
    }

    /// Stop the agent currently driving, if any.
    fn cancel_drive(&mut self) {
        if let Interaction::Driving { agent } = self.interaction {
            if self.scheduler.agent() == Some(agent) {
                self.scheduler.abort();
            }
            if let Some(a) = self.agents.get_mut(&agent) {
                a.status = AgentStatus::Waiting;
            }
            self.interaction = Interaction::Idle;
        }
    }

    /// Stop all motion and any exit sequence.
    fn cancel_activity(&mut self) {
        self.exit.abort();
        self.scheduler.abort();

        for agent in self.agents.values_mut() {
            if agent.status == AgentStatus::Moving {
                agent.status = AgentStatus::Waiting;
            }
        }

        self.interaction = Interaction::Idle;
    }

    /// Write the scheduler's pose into the agent and the world.
    fn apply_sample(&mut self, sample: &motion::MotionSample) -> Result<(), SandboxError> {
        let agent = self
            .agents
            .get_mut(&sample.agent)
            .ok_or(SandboxError::UnknownAgent(sample.agent))?;

        agent.position = sample.pose.position;
        agent.heading_deg = sample.pose.heading_deg;
        agent.orientation = sample.pose.orientation;

        self.world.move_agent(agent.id, agent.tracked())?;

        Ok(())
    }

    /// Handle the end of an agent's motion sequence.
    fn on_motion_finished(&mut self, agent_id: AgentId) -> Result<(), SandboxError> {
        if self.exit.active_agent() == Some(agent_id) {
            // The coordinator has already emitted the failed event
            if let Err(e) = self.exit.on_motion_finished(
                agent_id,
                &mut self.world,
                &mut self.agents,
                &mut self.scheduler,
            ) {
                warn!("Exit sequence stopped: {}", e);
            }
            return Ok(());
        }

        let agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or(SandboxError::UnknownAgent(agent_id))?;

        let pose = agent.grid_pose();
        agent.snap_to(pose);
        agent.status = AgentStatus::Waiting;
        self.world.move_agent(agent_id, agent.tracked())?;

        info!("Agent {} reached its drive goal {}", agent_id, agent.grid_pose());

        if self.interaction == (Interaction::Driving { agent: agent_id }) {
            self.interaction = Interaction::Idle;
        }
        self.pending_events
            .push(SandboxEvent::DriveFinished { agent: agent_id });

        Ok(())
    }

    fn snapshot(&self, events: Vec<SandboxEvent>) -> TickOutput {
        TickOutput {
            sim_time_s: self.sim_time_s,
            agents: self.agents.values().cloned().collect(),
            events,
        }
    }
}

impl State for Sandbox {
    type InitData = ();
    type InitError = SandboxError;

    type InputData = f64;
    type OutputData = TickOutput;
    type StatusReport = SandboxStatus;
    type ProcError = SandboxError;

    /// Open the agent archive in the session.
    fn init(&mut self, _init_data: (), session: &Session) -> Result<(), SandboxError> {
        self.arch_agents = Archiver::from_path(session, "sandbox/agents.csv")?;

        info!(
            "Sandbox initialised with a {}x{} world",
            self.world.width(),
            self.world.height()
        );

        Ok(())
    }

    /// Advance the simulation by the input tick duration.
    fn proc(&mut self, dt_s: &f64) -> Result<(TickOutput, SandboxStatus), SandboxError> {
        let dt_s = *dt_s;
        if !dt_s.is_finite() || dt_s < 0.0 {
            return Err(SandboxError::InvalidTick(dt_s));
        }

        self.sim_time_s += dt_s;

        let (sample, motion_report) = self.scheduler.proc(dt_s)?;

        if let Some(sample) = sample {
            self.apply_sample(&sample)?;

            if motion_report.finished {
                self.on_motion_finished(sample.agent)?;
            }
        }

        let exit_events = self.exit.take_events();
        if self.interaction == Interaction::Sequencing && !self.exit.is_running() {
            self.interaction = Interaction::Idle;
        }

        let mut events = std::mem::take(&mut self.pending_events);
        events.extend(exit_events.into_iter().map(SandboxEvent::Exit));

        let status = SandboxStatus {
            motion: motion_report,
            driving: match self.interaction {
                Interaction::Driving { agent } => Some(agent),
                _ => None,
            },
            exit_active_agent: self.exit.active_agent(),
            exit_num_queued: self.exit.num_queued(),
        };

        Ok((self.snapshot(events), status))
    }
}

impl Archived for Sandbox {
    fn write(&mut self, sim_time_s: f64) -> Result<(), ArchiveError> {
        if !self.arch_agents.is_open() {
            return Ok(());
        }

        for agent in self.agents.values() {
            self.arch_agents.serialise(&agent.arch_row(sim_time_s))?;
        }

        Ok(())
    }
}

impl TickOutput {
    pub fn to_tm(&self) -> TickTm {
        TickTm {
            sim_time_s: self.sim_time_s,
            agents: self.agents.iter().map(Agent::to_tm).collect(),
            events: self.events.iter().cloned().map(EventTm::from).collect(),
        }
    }
}

impl From<SandboxEvent> for EventTm {
    fn from(e: SandboxEvent) -> Self {
        match e {
            SandboxEvent::DriveFinished { agent } => EventTm::DriveFinished { agent },
            SandboxEvent::Exit(e) => e.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Waypoints from the agent's current continuous pose through each cell of the path.
///
/// The first path cell is skipped if the agent is already sitting on it, or already lies between
/// it and the second cell, so the agent never steps back to it.
fn drive_waypoints(agent: &Agent, path: &[Cell]) -> Vec<Waypoint> {
    let heading_deg = agent.orientation.heading_deg();
    let mut waypoints = vec![Waypoint {
        position: agent.position,
        heading_deg: agent.heading_deg,
        orientation: agent.orientation,
    }];

    let skip_first = match path {
        [first, second, ..] => lies_between(&agent.position, first, second),
        [first] => (first.to_point() - agent.position).norm() < 1e-9,
        [] => false,
    };

    for cell in path.iter().skip(skip_first as usize) {
        waypoints.push(Waypoint::at_cell(cell, agent.orientation, heading_deg));
    }

    waypoints
}

/// Returns true if the point lies on the straight step from cell `a` to cell `b`, `a` included.
fn lies_between(point: &Point2<f64>, a: &Cell, b: &Cell) -> bool {
    const EPS: f64 = 1e-9;

    let ab = b.to_point() - a.to_point();
    let ap = *point - a.to_point();
    let cross = ab.x * ap.y - ab.y * ap.x;
    let t = ap.dot(&ab) / ab.norm_squared().max(EPS);

    cross.abs() < EPS && t > -EPS && t < 1.0 + EPS
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Orientation;
    use crate::nav::path_cost;

    const DT_S: f64 = 0.05;

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxParams::default()).unwrap()
    }

    /// Tick until the sandbox is idle, collecting every event and checking no two agents overlap.
    fn run_until_idle(sb: &mut Sandbox, max_ticks: usize) -> Vec<SandboxEvent> {
        let mut events = Vec::new();

        for _ in 0..max_ticks {
            let out = sb.tick(DT_S);

            for (i, a) in out.agents.iter().enumerate() {
                for b in out.agents.iter().skip(i + 1) {
                    assert!(
                        !a.rect().overlaps(&b.rect()),
                        "agents {} and {} overlap at t = {:.2}",
                        a.id,
                        b.id,
                        out.sim_time_s
                    );
                }
            }

            events.extend(out.events);

            if sb.is_idle() && sb.interaction() == Interaction::Idle {
                // One more tick to flush events raised on the final one
                events.extend(sb.tick(DT_S).events);
                return events;
            }
        }

        panic!("Sandbox still busy after {} ticks", max_ticks);
    }

    #[test]
    fn test_exit_sequence_parks_in_order() {
        let mut sb = sandbox();
        for (id, x) in [(1, 1), (2, 3), (3, 5)].iter() {
            sb.add_agent(*id, GridPose::new(*x, 8, Orientation::North), 1, 1)
                .unwrap();
        }

        let targets = [
            GridPose::new(1, 1, Orientation::North),
            GridPose::new(4, 1, Orientation::North),
            GridPose::new(7, 1, Orientation::North),
        ];
        let assignments = (1..=3)
            .zip(targets.iter())
            .map(|(agent, target)| ExitAssignment {
                agent,
                target: *target,
                corridor_length: None,
            })
            .collect();

        sb.run_exit_sequence(assignments).unwrap();
        assert_eq!(sb.interaction(), Interaction::Sequencing);

        let events = run_until_idle(&mut sb, 2000);

        let expected: Vec<SandboxEvent> = vec![
            ExitEvent::Started { agent: 1 },
            ExitEvent::Parked { agent: 1 },
            ExitEvent::Started { agent: 2 },
            ExitEvent::Parked { agent: 2 },
            ExitEvent::Started { agent: 3 },
            ExitEvent::Parked { agent: 3 },
            ExitEvent::Complete,
        ]
        .into_iter()
        .map(SandboxEvent::Exit)
        .collect();
        assert_eq!(events, expected);

        for (id, target) in (1..=3).zip(targets.iter()) {
            let agent = sb.agent(id).unwrap();
            assert_eq!(agent.status, AgentStatus::Parked);
            assert_eq!(agent.grid_pose(), *target);
        }
        assert_eq!(sb.interaction(), Interaction::Idle);
    }

    #[test]
    fn test_exit_sequence_blocked_corridor() {
        let mut sb = sandbox();
        sb.add_agent(1, GridPose::new(2, 8, Orientation::North), 1, 1)
            .unwrap();
        sb.set_obstacles(&[Cell::new(2, 6)]).unwrap();

        let res = sb.run_exit_sequence(vec![ExitAssignment {
            agent: 1,
            target: GridPose::new(2, 1, Orientation::North),
            corridor_length: Some(3),
        }]);
        assert!(matches!(
            res,
            Err(SandboxError::Exit(ExitSeqError::CorridorBlocked { agent: 1, .. }))
        ));
        assert_eq!(sb.interaction(), Interaction::Idle);

        // The failure is still reported through the next tick
        let out = sb.tick(DT_S);
        assert!(matches!(
            out.events.as_slice(),
            [SandboxEvent::Exit(ExitEvent::Failed { agent: 1, .. })]
        ));
        assert_eq!(sb.agent(1).unwrap().grid_pose(), GridPose::new(2, 8, Orientation::North));
    }

    #[test]
    fn test_exit_validation_emits_nothing() {
        let mut sb = sandbox();
        assert!(matches!(
            sb.run_exit_sequence(Vec::new()),
            Err(SandboxError::Exit(ExitSeqError::EmptySequence))
        ));
        assert!(sb.tick(DT_S).events.is_empty());
    }

    #[test]
    fn test_drive_with_replan() {
        let mut sb = sandbox();
        sb.add_agent(1, GridPose::new(0, 5, Orientation::East), 1, 1)
            .unwrap();

        let path = sb.drive_to(1, Cell::new(9, 5)).unwrap();
        assert_eq!(path_cost(&path), 9);
        assert_eq!(sb.interaction(), Interaction::Driving { agent: 1 });
        assert_eq!(sb.agent(1).unwrap().status, AgentStatus::Moving);

        // 0.4 s at 4 cells/s leaves the agent part way between (1, 5) and (2, 5)
        for _ in 0..8 {
            sb.tick(DT_S);
        }
        assert_eq!(sb.agent(1).unwrap().cell(), Cell::new(2, 5));

        let edited = sb.set_obstacles(&[Cell::new(5, 5)]).unwrap();
        let repaired = sb.replan(&edited).unwrap();
        assert_eq!(repaired.first(), Some(&Cell::new(2, 5)));
        assert_eq!(path_cost(&repaired), 9);
        assert!(!repaired.contains(&Cell::new(5, 5)));

        let mut finished = false;
        for _ in 0..200 {
            let out = sb.tick(DT_S);
            assert_ne!(sb.agent(1).unwrap().cell(), Cell::new(5, 5));

            if out.events.contains(&SandboxEvent::DriveFinished { agent: 1 }) {
                finished = true;
                break;
            }
        }
        assert!(finished);

        let agent = sb.agent(1).unwrap();
        assert_eq!(agent.cell(), Cell::new(9, 5));
        assert_eq!(agent.status, AgentStatus::Waiting);
        assert_eq!(sb.interaction(), Interaction::Idle);
    }

    #[test]
    fn test_replan_mid_segment_keeps_going_forwards() {
        let mut sb = sandbox();
        sb.add_agent(1, GridPose::new(0, 5, Orientation::East), 1, 1)
            .unwrap();
        sb.drive_to(1, Cell::new(9, 5)).unwrap();

        // 0.35 s leaves the agent at x = 1.4, nearer (1, 5) than the (2, 5) it is heading to
        for _ in 0..7 {
            sb.tick(DT_S);
        }
        let mut last_x = sb.agent(1).unwrap().position.x;
        assert!((last_x - 1.4).abs() < 1e-6);

        let edited = sb.set_obstacles(&[Cell::new(5, 5)]).unwrap();
        let repaired = sb.replan(&edited).unwrap();
        assert_eq!(repaired.first(), Some(&Cell::new(2, 5)));

        let mut finished = false;
        for _ in 0..200 {
            let out = sb.tick(DT_S);
            let x = sb.agent(1).unwrap().position.x;
            assert!(x >= last_x - 1e-9, "agent went back from x = {} to {}", last_x, x);
            last_x = x;

            if out.events.contains(&SandboxEvent::DriveFinished { agent: 1 }) {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert_eq!(sb.agent(1).unwrap().cell(), Cell::new(9, 5));

        // A new target mid-segment carries on to the segment end too
        sb.set_obstacles(&[]).unwrap();
        sb.drive_to(1, Cell::new(0, 5)).unwrap();
        sb.tick(DT_S);
        let x_before = sb.agent(1).unwrap().position.x;
        assert!((x_before - 8.8).abs() < 1e-6);

        sb.drive_to(1, Cell::new(0, 0)).unwrap();
        for _ in 0..4 {
            sb.tick(DT_S);
            assert!(sb.agent(1).unwrap().position.x <= x_before + 1e-9);
        }
    }

    #[test]
    fn test_out_of_range_requests_rejected() {
        let mut sb = sandbox();

        assert!(matches!(
            sb.add_agent(1, GridPose::new(i32::MAX, 0, Orientation::North), 2, 1),
            Err(SandboxError::InvalidPlacement(_))
        ));
        assert!(matches!(
            sb.add_agent(1, GridPose::new(0, 0, Orientation::North), 70000, 70000),
            Err(SandboxError::InvalidPlacement(_))
        ));
        assert!(matches!(
            sb.add_agent(1, GridPose::new(i32::MIN, -1, Orientation::East), 1, 1),
            Err(SandboxError::InvalidPlacement(_))
        ));
        assert!(sb.agents().is_empty());

        sb.add_agent(1, GridPose::new(2, 2, Orientation::North), 2, 1)
            .unwrap();
        sb.handle_gesture(Gesture::BeginDrag { agent: 1 }).unwrap();
        assert!(matches!(
            sb.handle_gesture(Gesture::DragTo {
                cell: Cell::new(i32::MAX, 0)
            }),
            Err(SandboxError::Interaction(InteractionError::PlacementRejected { .. }))
        ));
        sb.handle_gesture(Gesture::EndDrag).unwrap();
        assert_eq!(sb.agent(1).unwrap().cell(), Cell::new(2, 2));

        assert!(matches!(
            sb.handle_gesture(Gesture::Place {
                agent: 1,
                pose: GridPose::new(0, 0, Orientation::East),
                width: u32::MAX,
                height: 1,
            }),
            Err(SandboxError::Interaction(InteractionError::PlacementRejected { .. }))
        ));

        let nan = RotatedRect::new(Point2::new(f64::NAN, 1.0), 1.0, 1.0, 0.0);
        assert!(matches!(
            sb.add_obstacle_rect(nan),
            Err(SandboxError::InvalidPlacement(_))
        ));
        assert!(sb.world().obstacle_rects().is_empty());
    }

    #[test]
    fn test_drive_to_own_cell() {
        let mut sb = sandbox();
        sb.add_agent(4, GridPose::new(3, 3, Orientation::South), 1, 1)
            .unwrap();

        let path = sb.drive_to(4, Cell::new(3, 3)).unwrap();
        assert!(path.is_empty());
        assert_eq!(sb.interaction(), Interaction::Idle);
        assert_eq!(
            sb.tick(DT_S).events,
            vec![SandboxEvent::DriveFinished { agent: 4 }]
        );
    }

    #[test]
    fn test_replan_without_plan() {
        let mut sb = sandbox();
        assert!(matches!(
            sb.replan(&[Cell::new(1, 1)]),
            Err(SandboxError::NoActivePlan)
        ));
    }

    #[test]
    fn test_gestures() {
        let mut sb = sandbox();

        sb.handle_gesture(Gesture::Place {
            agent: 1,
            pose: GridPose::new(2, 2, Orientation::North),
            width: 1,
            height: 1,
        })
        .unwrap();
        sb.add_agent(2, GridPose::new(4, 2, Orientation::North), 1, 1)
            .unwrap();

        sb.handle_gesture(Gesture::BeginDrag { agent: 1 }).unwrap();

        // Can't drop onto another agent, or click while dragging
        assert!(matches!(
            sb.handle_gesture(Gesture::DragTo {
                cell: Cell::new(4, 2)
            }),
            Err(SandboxError::Interaction(
                InteractionError::PlacementRejected { agent: 1, .. }
            ))
        ));
        assert!(matches!(
            sb.handle_gesture(Gesture::ClickTarget {
                agent: 1,
                cell: Cell::new(0, 0)
            }),
            Err(SandboxError::Interaction(InteractionError::Busy { .. }))
        ));

        sb.handle_gesture(Gesture::DragTo {
            cell: Cell::new(3, 3),
        })
        .unwrap();
        sb.handle_gesture(Gesture::EndDrag).unwrap();
        assert_eq!(sb.interaction(), Interaction::Idle);
        assert_eq!(sb.agent(1).unwrap().cell(), Cell::new(3, 3));
        assert!(sb.world().is_free(&Cell::new(2, 2), None));
        assert!(!sb.world().is_free(&Cell::new(3, 3), None));

        sb.handle_gesture(Gesture::Rotate { agent: 2 }).unwrap();
        assert_eq!(sb.agent(2).unwrap().orientation, Orientation::East);
    }

    #[test]
    fn test_rotate_rejected_when_blocked() {
        let mut sb = sandbox();
        sb.add_agent(3, GridPose::new(8, 0, Orientation::North), 2, 1)
            .unwrap();
        sb.set_obstacles(&[Cell::new(8, 1)]).unwrap();

        assert!(matches!(
            sb.handle_gesture(Gesture::Rotate { agent: 3 }),
            Err(SandboxError::Interaction(
                InteractionError::PlacementRejected { agent: 3, .. }
            ))
        ));
        assert_eq!(sb.agent(3).unwrap().orientation, Orientation::North);
    }

    #[test]
    fn test_placement_rules() {
        let mut sb = sandbox();
        sb.set_obstacles(&[Cell::new(5, 5)]).unwrap();

        assert!(matches!(
            sb.add_agent(1, GridPose::new(5, 5, Orientation::North), 1, 1),
            Err(SandboxError::InvalidPlacement(_))
        ));
        assert!(matches!(
            sb.add_agent(1, GridPose::new(9, 9, Orientation::North), 2, 1),
            Err(SandboxError::InvalidPlacement(_))
        ));

        sb.add_agent(1, GridPose::new(1, 1, Orientation::North), 1, 1)
            .unwrap();
        assert!(matches!(
            sb.add_agent(1, GridPose::new(2, 2, Orientation::North), 1, 1),
            Err(SandboxError::DuplicateAgent(1))
        ));

        let over_agent = RotatedRect::cell_square(Cell::new(1, 1));
        assert!(!sb.is_placement_valid(&over_agent, None));
        assert!(sb.is_placement_valid(&over_agent, Some(1)));
        assert!(matches!(
            sb.add_obstacle_rect(over_agent),
            Err(SandboxError::InvalidPlacement(_))
        ));

        let (id, changed) = sb
            .add_obstacle_rect(RotatedRect::cell_square(Cell::new(7, 7)))
            .unwrap();
        assert_eq!(changed, vec![Cell::new(7, 7)]);
        assert_eq!(sb.remove_obstacle_rect(id).unwrap(), vec![Cell::new(7, 7)]);
    }

    #[test]
    fn test_reset() {
        let mut sb = sandbox();
        sb.add_agent(1, GridPose::new(0, 0, Orientation::North), 1, 1)
            .unwrap();
        sb.add_obstacle_rect(RotatedRect::cell_square(Cell::new(5, 5)))
            .unwrap();
        sb.drive_to(1, Cell::new(9, 0)).unwrap();

        sb.reset();

        assert!(sb.agents().is_empty());
        assert!(sb.world().obstacle_rects().is_empty());
        assert!(sb.world().is_free(&Cell::new(5, 5), None));
        assert_eq!((sb.world().width(), sb.world().height()), (10, 10));
        assert_eq!(sb.interaction(), Interaction::Idle);
        assert!(sb.is_idle());
        assert!(sb.tick(DT_S).events.is_empty());
    }

    #[test]
    fn test_configure_world_cancels_drive() {
        let mut sb = sandbox();
        sb.add_agent(1, GridPose::new(0, 0, Orientation::North), 1, 1)
            .unwrap();
        sb.drive_to(1, Cell::new(0, 9)).unwrap();
        sb.tick(DT_S);

        let blocked = sb
            .configure_world(12, 12, Some(Area::new(0, 0, 12, 11)))
            .unwrap();
        assert_eq!(blocked.len(), 12);
        assert!(sb.is_idle());
        assert!(sb.drive_path().is_none());
        assert_eq!(sb.agent(1).unwrap().status, AgentStatus::Waiting);
    }

    #[test]
    fn test_tick_output_to_tm() {
        let mut sb = sandbox();
        sb.add_agent(2, GridPose::new(1, 1, Orientation::West), 1, 1)
            .unwrap();

        let tm = sb.tick(0.5).to_tm();
        assert_eq!(tm.sim_time_s, 0.5);
        assert_eq!(tm.agents.len(), 1);
        assert_eq!(tm.agents[0].heading_deg, 270.0);
        assert!(sb.tick(-1.0).events.is_empty());
    }
}
