//! Geometry-driven relay decisions.
//!
//! Three pure functions decide the fate of a request copy on a broadcast
//! link: how long to contend before relaying, whether to skip relaying at
//! all, and whether a relay already scheduled has become redundant. None of
//! them fail; missing positions resolve to the default documented on each.

use tracing::trace;

use crate::config::{CancelPolicy, DelayMode, ForwarderConfig};
use crate::descriptor::RouteDescriptor;
use crate::geometry::{angle_between, distance, projection_length, Position};
use crate::time::Duration;
use crate::traits::Random;

/// Contention delay before relaying on a broadcast link.
///
/// Nodes further from the sender make more progress. Unknown positions relay
/// immediately. Beyond `max_contend_distance` the fixed floor applies, with no
/// random draw. Otherwise the delay follows [`DelayMode`].
pub fn compute_relay_delay<R: Random>(
    config: &ForwarderConfig,
    random: &mut R,
    self_pos: Option<Position>,
    sender: Option<Position>,
) -> Duration {
    let (Some(self_pos), Some(sender)) = (self_pos, sender) else {
        return Duration::ZERO;
    };
    let d = distance(self_pos, sender);
    if !(d < config.max_contend_distance) {
        return config.delay_floor;
    }

    let jitter = draw_jitter(config, random);
    let delay = match config.delay_mode {
        DelayMode::Uniform => jitter,
        DelayMode::DistanceScaled => {
            let scale = (config.max_contend_distance - d) / config.max_contend_distance;
            Duration::from_secs_f64(config.max_delay.as_secs_f64() * scale) + jitter
        }
    };
    trace!(distance = d, delay_us = delay.as_micros(), "relay delay");
    delay
}

/// Uniform draw in `[min_delay, max_delay]`, shared with the response scheduler.
pub fn draw_jitter<R: Random>(config: &ForwarderConfig, random: &mut R) -> Duration {
    let min = config.min_delay.as_micros();
    let max = config.max_delay.as_micros().max(min);
    Duration::from_micros(random.gen_range(min, max.saturating_add(1)))
}

/// Whether a request copy should never be scheduled for relay.
///
/// Copies without a sender position (the originator's first transmission)
/// and nodes without a position fix are never suppressed. Neither are
/// requests without a route descriptor. When the descriptor carries no
/// source, the sender stands in for it.
pub fn should_suppress_relay(
    config: &ForwarderConfig,
    self_pos: Option<Position>,
    sender: Option<Position>,
    route: Option<&RouteDescriptor>,
) -> bool {
    let (Some(self_pos), Some(sender)) = (self_pos, sender) else {
        return false;
    };
    // Our own transmission heard back.
    if sender == self_pos {
        return true;
    }
    let Some(route) = route else {
        return false;
    };

    let source = route.source.unwrap_or(sender);
    let target = route.target;

    if distance(self_pos, source) < config.exclusion_radius
        || distance(self_pos, target) < config.exclusion_radius
    {
        return true;
    }

    let route_len = distance(source, target);
    if route_len < config.min_hop_distance {
        return true;
    }

    let angle = angle_between(target - source, self_pos - source);
    if angle.is_nan() || angle > 90.0 {
        trace!(angle, "behind route source");
        return true;
    }

    let projection = projection_length(source, target, self_pos);
    let limit = route.limit_or(config.corridor_limit);
    trace!(projection, route_len, limit, "corridor check");
    projection > route_len + limit
}

/// Whether a scheduled relay became redundant after hearing `new_sender`.
///
/// `prior_sender` is the sender of the copy that caused the scheduling.
/// Missing positions never cancel.
pub fn should_cancel_scheduled_relay(
    config: &ForwarderConfig,
    self_pos: Option<Position>,
    prior_sender: Option<Position>,
    new_sender: Option<Position>,
    target: Option<Position>,
) -> bool {
    match config.cancel_policy {
        CancelPolicy::ProgressOrProximity => {
            if let (Some(prior), Some(new), Some(target)) = (prior_sender, new_sender, target) {
                if distance(new, target) < distance(prior, target) {
                    return true;
                }
            }
            if let (Some(self_pos), Some(new)) = (self_pos, new_sender) {
                if distance(self_pos, new) < config.close_proximity {
                    return true;
                }
            }
            false
        }
        CancelPolicy::Projection => {
            let (Some(self_pos), Some(prior), Some(new)) = (self_pos, prior_sender, new_sender)
            else {
                return false;
            };
            let projection = projection_length(prior, self_pos, new);
            trace!(projection, "cancel projection");
            // NaN compares false.
            projection > distance(prior, self_pos)
        }
    }
}
