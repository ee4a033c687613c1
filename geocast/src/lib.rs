#![forbid(unsafe_code)]
//! geocast - geography-aware relay contention for broadcast content requests
//!
//! Nodes on a shared broadcast medium pull named content with request packets
//! and answer with response packets. Flooding every request wastes airtime,
//! so each node decides from its own position and the position carried by
//! the copy it heard whether to relay, after how long, and whether a relay it
//! already scheduled became redundant. The node that makes the most progress
//! relays first; the rest hear it and stand down.
//!
//! This crate is `no_std` but requires the `alloc` crate.
//!
//! # Key Properties
//!
//! - Leaderless: no coordination beyond overhearing each other's relays
//! - At most one scheduled relay per request and egress link
//! - Timers hold no references into the pending-request table; a timer
//!   whose record is gone fires as a no-op
//! - Missing positions and malformed route descriptors degrade to a
//!   conservative default and never fail
//! - Deterministic given a seed and explicit time
//!
//! # Example (decision policies)
//!
//! ```
//! use geocast::{compute_relay_delay, should_suppress_relay, Duration, ForwarderConfig,
//!               Name, Position, RouteDescriptor, SeededRandom};
//!
//! let config = ForwarderConfig::default();
//! let mut rng = SeededRandom::new(1);
//!
//! // Sender beyond contention range: fixed floor.
//! let delay = compute_relay_delay(
//!     &config,
//!     &mut rng,
//!     Some(Position::ZERO),
//!     Some(Position::new(1000.0, 0.0, 0.0)),
//! );
//! assert_eq!(delay, Duration::from_millis(10));
//!
//! // Inside the corridor toward the target: relay.
//! let name = Name::parse("/road/0,0,0/1000,0,0/9000/50/1");
//! let route = RouteDescriptor::from_name(&name).unwrap();
//! assert!(!should_suppress_relay(
//!     &config,
//!     Some(Position::new(500.0, 100.0, 0.0)),
//!     Some(Position::new(400.0, 0.0, 0.0)),
//!     route.as_ref(),
//! ));
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! use geocast::{Forwarder, ForwarderConfig, SeededRandom};
//!
//! // Implement Transport, Fib, PositionSource and Clock for your platform...
//!
//! let mut forwarder = Forwarder::new(radio, fib, gps, SeededRandom::new(seed), clock,
//!                                    ForwarderConfig::default());
//!
//! // Spawn the run loop
//! spawn(async move {
//!     forwarder.run().await;
//! });
//!
//! // Observe decisions
//! // let event = forwarder.events().receive().await;
//! ```
//!
//! # Module Structure
//!
//! - [`geometry`] - Vector arithmetic, distance, projection, angle
//! - [`time`] - Timestamp and Duration types
//! - [`types`] - Names, links, packets, events
//! - [`descriptor`] - Route descriptor encoded in request names
//! - [`config`] - Runtime configuration
//! - [`traits`] - Transport, Fib, PositionSource, Clock, Random
//! - [`timer`] - Cancellable timer queue
//! - [`pit`] - Pending-request table
//! - [`policy`] - Delay, suppression and cancellation decisions
//! - [`forwarder`] - Request handlers and run loop
//! - [`response`] - Response relay scheduling
//! - [`metrics`] - Decision counters

#![no_std]

// Mock collaborators must not ship in release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It exposes mock collaborators intended only for tests and simulation."
);

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod descriptor;
pub mod forwarder;
pub mod geometry;
pub mod metrics;
pub mod pit;
pub mod policy;
pub mod response;
pub mod time;
pub mod timer;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use config::{CancelPolicy, ConfigError, DelayMode, ForwarderConfig};
pub use descriptor::{DescriptorError, RouteDescriptor};
pub use forwarder::Forwarder;
pub use geometry::{angle_between, distance, projection_length, Position, Vector3};
pub use metrics::ForwarderMetrics;
pub use policy::{compute_relay_delay, should_cancel_scheduled_relay, should_suppress_relay};
pub use time::{Duration, Timestamp};
pub use timer::TimerId;
pub use traits::{Clock, Fib, PositionSource, Random, SeededRandom, Transport};
pub use types::{
    ActionKind, Event, Incoming, LinkId, LinkKind, Name, NextHop, Packet, RejectReason, Request,
    Response,
};
