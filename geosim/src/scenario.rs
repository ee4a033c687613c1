//! Scenario builder for setting up and running simulations.

use geocast::{Duration, ForwarderConfig, Name, Timestamp, Vector3};

use crate::event::{NodeId, ScenarioAction};
use crate::metrics::SimulationResult;
use crate::node::AppRole;
use crate::sim::{SimError, Simulator, DEFAULT_LOSS_WINDOW};
use crate::topology::{Link, Topology};

/// Default name prefix served by the producer.
pub const DEFAULT_PREFIX: &str = "/geo";

#[derive(Debug, Clone)]
enum Layout {
    Line,
    Grid { columns: usize },
    Custom(Topology),
}

/// Builder for simulation scenarios.
///
/// Defaults: nodes on a line 100 apart with radio range 150, the consumer at
/// the first node and the producer at the last, ten requests 500ms apart.
pub struct ScenarioBuilder {
    num_nodes: usize,
    seed: u64,
    layout: Layout,
    spacing: f64,
    range: f64,
    medium: Link,
    config: ForwarderConfig,
    prefix: Name,
    consumer: NodeId,
    producer: Option<NodeId>,
    payload_size: usize,
    requests: u64,
    interval: Duration,
    start: Timestamp,
    loss_window: u32,
    velocities: Vec<(NodeId, Vector3)>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    event_log: bool,
}

impl ScenarioBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            layout: Layout::Line,
            spacing: 100.0,
            range: 150.0,
            medium: Link::default(),
            config: ForwarderConfig::default(),
            prefix: Name::parse(DEFAULT_PREFIX),
            consumer: 0,
            producer: None,
            payload_size: 64,
            requests: 10,
            interval: Duration::from_millis(500),
            start: Timestamp::from_millis(100),
            loss_window: DEFAULT_LOSS_WINDOW,
            velocities: Vec::new(),
            actions: Vec::new(),
            event_log: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Nodes on the x axis.
    pub fn line(mut self) -> Self {
        self.layout = Layout::Line;
        self
    }

    /// Nodes filled row by row into `columns` columns.
    pub fn grid(mut self, columns: usize) -> Self {
        self.layout = Layout::Grid { columns };
        self
    }

    /// Use a prepared topology; its node count replaces the builder's.
    pub fn topology(mut self, topology: Topology) -> Self {
        self.num_nodes = topology.len();
        self.layout = Layout::Custom(topology);
        self
    }

    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.medium = self.medium.with_loss_rate(rate);
        self
    }

    pub fn with_link_delay(mut self, delay: Duration) -> Self {
        self.medium = self.medium.with_delay(delay);
        self
    }

    pub fn with_config(mut self, config: ForwarderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prefix(mut self, prefix: Name) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn consumer(mut self, node: NodeId) -> Self {
        self.consumer = node;
        self
    }

    /// Defaults to the last node.
    pub fn producer(mut self, node: NodeId) -> Self {
        self.producer = Some(node);
        self
    }

    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }

    pub fn with_requests(mut self, count: u64, interval: Duration) -> Self {
        self.requests = count;
        self.interval = interval;
        self
    }

    pub fn starting_at(mut self, start: Timestamp) -> Self {
        self.start = start;
        self
    }

    pub fn with_loss_window(mut self, window: u32) -> Self {
        self.loss_window = window;
        self
    }

    /// Give a node constant velocity from time zero.
    pub fn with_velocity(mut self, node: NodeId, velocity: Vector3) -> Self {
        self.velocities.push((node, velocity));
        self
    }

    pub fn at(mut self, time: Timestamp, action: ScenarioAction) -> Self {
        self.actions.push((time, action));
        self
    }

    pub fn with_event_log(mut self) -> Self {
        self.event_log = true;
        self
    }

    /// Build the simulator with roles assigned and requests queued.
    pub fn build(self) -> Result<Simulator, SimError> {
        let mut topology = match self.layout {
            Layout::Line => Topology::line(self.num_nodes, self.spacing, self.range),
            Layout::Grid { columns } => Topology::grid(self.num_nodes, columns, self.spacing, self.range),
            Layout::Custom(topology) => topology,
        }
        .with_medium(self.medium);
        for (node, velocity) in self.velocities {
            topology.set_velocity(node, velocity, Timestamp::ZERO);
        }

        let mut sim = Simulator::new(self.seed, topology, self.config)?.with_loss_window(self.loss_window)?;
        if self.event_log {
            sim = sim.with_event_log();
        }

        let producer = self.producer.unwrap_or(self.num_nodes.saturating_sub(1));
        sim.set_role(
            self.consumer,
            AppRole::Consumer {
                prefix: self.prefix.clone(),
            },
        )?;
        sim.set_role(
            producer,
            AppRole::Producer {
                prefix: self.prefix,
                payload_size: self.payload_size,
            },
        )?;

        sim.schedule_requests(self.consumer, self.requests, self.start, self.interval);
        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }
        Ok(sim)
    }

    pub fn run_for(self, duration: Duration) -> Result<SimulationResult, SimError> {
        let mut sim = self.build()?;
        Ok(sim.run_for(duration))
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(5)
    }
}
