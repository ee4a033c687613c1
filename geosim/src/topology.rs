//! Node placement, mobility and the shared radio medium.
//!
//! Connectivity is not a fixed graph: two nodes hear each other whenever
//! their positions at the current time are within radio range.

use geocast::{distance, Duration, Position, Timestamp, Vector3};

use crate::event::NodeId;

/// Properties of the shared broadcast medium.
#[derive(Debug, Clone)]
pub struct Link {
    /// Packet loss rate per receiver (0.0 to 1.0).
    pub loss_rate: f64,
    /// Propagation plus transmission delay.
    pub delay: Duration,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Constant-velocity motion: position at `t` is `origin + velocity * t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mobility {
    pub origin: Position,
    /// Units per second.
    pub velocity: Vector3,
    /// Time the node was at `origin`.
    pub since: Timestamp,
}

impl Mobility {
    pub fn stationary(at: Position) -> Self {
        Self {
            origin: at,
            velocity: Vector3::ZERO,
            since: Timestamp::ZERO,
        }
    }

    pub fn moving(at: Position, velocity: Vector3) -> Self {
        Self {
            origin: at,
            velocity,
            since: Timestamp::ZERO,
        }
    }

    pub fn position_at(&self, time: Timestamp) -> Position {
        let elapsed = time.saturating_sub(self.since).as_secs_f64();
        self.origin + self.velocity * elapsed
    }
}

/// Positions of every node plus the radio model.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Mobility>,
    range: f64,
    medium: Link,
}

impl Topology {
    /// Create an empty topology with the given radio range.
    pub fn new(range: f64) -> Self {
        Self {
            nodes: Vec::new(),
            range,
            medium: Link::default(),
        }
    }

    pub fn with_medium(mut self, medium: Link) -> Self {
        self.medium = medium;
        self
    }

    /// `count` stationary nodes on the x axis, `spacing` apart.
    pub fn line(count: usize, spacing: f64, range: f64) -> Self {
        let mut topo = Self::new(range);
        for i in 0..count {
            topo.add_node(Mobility::stationary(Position::new(i as f64 * spacing, 0.0, 0.0)));
        }
        topo
    }

    /// `count` stationary nodes filled row by row into `columns` columns.
    pub fn grid(count: usize, columns: usize, spacing: f64, range: f64) -> Self {
        let columns = columns.max(1);
        let mut topo = Self::new(range);
        for i in 0..count {
            let x = (i % columns) as f64 * spacing;
            let y = (i / columns) as f64 * spacing;
            topo.add_node(Mobility::stationary(Position::new(x, y, 0.0)));
        }
        topo
    }

    pub fn add_node(&mut self, mobility: Mobility) -> NodeId {
        self.nodes.push(mobility);
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn set_range(&mut self, range: f64) {
        self.range = range;
    }

    pub fn medium(&self) -> &Link {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut Link {
        &mut self.medium
    }

    pub fn mobility(&self, node: NodeId) -> Option<&Mobility> {
        self.nodes.get(node)
    }

    pub fn position(&self, node: NodeId, time: Timestamp) -> Option<Position> {
        self.nodes.get(node).map(|m| m.position_at(time))
    }

    /// Change velocity at `now`, continuing from the current position.
    pub fn set_velocity(&mut self, node: NodeId, velocity: Vector3, now: Timestamp) {
        if let Some(m) = self.nodes.get_mut(node) {
            *m = Mobility {
                origin: m.position_at(now),
                velocity,
                since: now,
            };
        }
    }

    /// Nodes within radio range of `node` at `time`, excluding itself.
    pub fn neighbors(&self, node: NodeId, time: Timestamp) -> Vec<NodeId> {
        let Some(at) = self.position(node, time) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .enumerate()
            .filter(|&(other, m)| other != node && distance(at, m.position_at(time)) <= self.range)
            .map(|(other, _)| other)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_neighbors() {
        let topo = Topology::line(4, 100.0, 150.0);
        assert_eq!(topo.neighbors(0, Timestamp::ZERO), vec![1]);
        assert_eq!(topo.neighbors(1, Timestamp::ZERO), vec![0, 2]);
        assert_eq!(topo.neighbors(3, Timestamp::ZERO), vec![2]);
    }

    #[test]
    fn test_grid_includes_diagonals_in_range() {
        let topo = Topology::grid(9, 3, 100.0, 150.0);
        // Center node hears all eight others (diagonal ~141).
        assert_eq!(topo.neighbors(4, Timestamp::ZERO).len(), 8);
        assert_eq!(topo.neighbors(0, Timestamp::ZERO), vec![1, 3, 4]);
    }

    #[test]
    fn test_mobility_moves_out_of_range() {
        let mut topo = Topology::new(150.0);
        let a = topo.add_node(Mobility::stationary(Position::ZERO));
        let b = topo.add_node(Mobility::moving(
            Position::new(100.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
        ));

        assert_eq!(topo.neighbors(a, Timestamp::ZERO), vec![b]);
        assert_eq!(
            topo.position(b, Timestamp::from_secs(3)),
            Some(Position::new(130.0, 0.0, 0.0))
        );
        assert!(topo.neighbors(a, Timestamp::from_secs(6)).is_empty());
    }

    #[test]
    fn test_set_velocity_continues_from_current_position() {
        let mut topo = Topology::new(100.0);
        let n = topo.add_node(Mobility::moving(Position::ZERO, Vector3::new(1.0, 0.0, 0.0)));
        topo.set_velocity(n, Vector3::new(0.0, 2.0, 0.0), Timestamp::from_secs(10));
        assert_eq!(
            topo.position(n, Timestamp::from_secs(15)),
            Some(Position::new(10.0, 10.0, 0.0))
        );
    }
}
