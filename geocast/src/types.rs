//! Core types for the forwarding engine: names, links, packets and events.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::geometry::Position;

/// Identifier of a local link (face). Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub u32);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Capability of an egress link.
///
/// Broadcast links reach every neighbor with one transmission and are the
/// source of forwarding contention. Point-to-point links never contend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    PointToPoint,
    Broadcast,
}

/// A next hop as enumerated by the routing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub link: LinkId,
    pub kind: LinkKind,
}

impl NextHop {
    pub const fn broadcast(link: LinkId) -> Self {
        Self {
            link,
            kind: LinkKind::Broadcast,
        }
    }

    pub const fn point_to_point(link: LinkId) -> Self {
        Self {
            link,
            kind: LinkKind::PointToPoint,
        }
    }
}

/// Hierarchical content name, e.g. `/traffic/seg/0%2C0%2C0/1000%2C0%2C0/5000/50/7`.
///
/// Components are stored already split; empty components are dropped on
/// parse so `/a//b` and `/a/b` are the same name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated URI form.
    pub fn parse(uri: &str) -> Self {
        Self {
            components: uri
                .split('/')
                .filter(|c| !c.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Append one component, returning the extended name.
    pub fn append(mut self, component: impl Into<String>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component at `index`; negative indices count from the end (`-1` is last).
    pub fn get(&self, index: isize) -> Option<&str> {
        let idx = if index < 0 {
            self.components.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.components.get(idx).map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// True when every component of `self` is a leading component of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for c in &self.components {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(uri: &str) -> Self {
        Self::parse(uri)
    }
}

/// A content request.
///
/// `geo_tag` is the position of whoever transmitted this copy. The originator's
/// first transmission carries none; every relayed copy carries the relayer's
/// position at transmission time.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub name: Name,
    /// Random value identifying one request instance across relays.
    pub nonce: u32,
    pub geo_tag: Option<Position>,
}

impl Request {
    pub fn new(name: Name, nonce: u32) -> Self {
        Self {
            name,
            nonce,
            geo_tag: None,
        }
    }

    pub fn with_geo_tag(mut self, position: Position) -> Self {
        self.geo_tag = Some(position);
        self
    }
}

/// The content answering a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub name: Name,
    pub content: Vec<u8>,
    pub geo_tag: Option<Position>,
}

impl Response {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content,
            geo_tag: None,
        }
    }

    pub fn with_geo_tag(mut self, position: Position) -> Self {
        self.geo_tag = Some(position);
        self
    }
}

/// Anything that crosses a link.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Request(Request),
    Response(Response),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Packet::Request(r) => &r.name,
            Packet::Response(r) => &r.name,
        }
    }

    pub fn geo_tag(&self) -> Option<Position> {
        match self {
            Packet::Request(r) => r.geo_tag,
            Packet::Response(r) => r.geo_tag,
        }
    }
}

/// Packet received on a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub link: LinkId,
    pub packet: Packet,
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The routing collaborator returned no usable next hop.
    NoRoute,
    /// Every broadcast next hop was suppressed by the geometry policy.
    Suppressed,
}

/// What the engine did, published on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Received,
    ReceivedDuplicate,
    RelayScheduled,
    RelaySent,
    RelaySuppressed,
    RelayCanceled,
    Rejected(RejectReason),
    ResponseReceived,
    ResponseScheduled,
    ResponseSent,
    ResponseCanceled,
}

/// Protocol event with the node position at the time it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: Name,
    pub kind: ActionKind,
    pub link: Option<LinkId>,
    pub position: Option<Position>,
}
