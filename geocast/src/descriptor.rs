//! Route descriptor carried in the request name.
//!
//! The direction-limited variant encodes where a request is headed in the
//! trailing name components. Two layouts are accepted:
//!
//! ```text
//! /<prefix...>/[source]/<target>/<limit>/<seq>
//! /<prefix...>/[source]/<target>/<arrival-ms>/<limit>/<seq>
//! ```
//!
//! Counted from the end, `-1` is the per-request sequence suffix and `-2` the
//! corridor limit (`_` selects the configured default). When `-3` holds a
//! position it is the target and `-4` an optional source. Otherwise `-3` is
//! the target arrival time in milliseconds, `-4` the target and `-5` an
//! optional source. Positions are `x,y,z`, with the comma optionally
//! percent-encoded as `%2C`.
//!
//! Names arrive from the network and are untrusted. Parsing never panics; a
//! name with no coordinate triple in a target slot carries no descriptor at
//! all, anything else that fails to parse is a [`DescriptorError`].

use alloc::format;
use alloc::string::String;

use thiserror::Error;

use crate::geometry::Position;
use crate::time::Timestamp;
use crate::types::Name;

/// Marker for "use the configured corridor limit".
pub const DEFAULT_LIMIT_MARKER: &str = "_";

const ENCODED_COMMA: &str = "%2C";

/// Reasons a route descriptor failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("name has {0} components, route descriptor needs at least 3")]
    TooShort(usize),
    #[error("{field}: expected 3 coordinates, found {found}")]
    CoordinateCount { field: &'static str, found: usize },
    #[error("{field}: `{value}` is not a finite number")]
    InvalidNumber { field: &'static str, value: String },
    #[error("corridor limit must not be negative")]
    NegativeLimit,
}

/// Direction and corridor of a request, parsed from its name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteDescriptor {
    /// Where the request started its directed journey, if encoded.
    pub source: Option<Position>,
    pub target: Position,
    /// When the request is expected at the target, if encoded.
    pub arrival: Option<Timestamp>,
    /// Corridor half-width; `None` means the configured default applies.
    pub limit: Option<f64>,
}

impl RouteDescriptor {
    /// Parse the descriptor from the trailing components of `name`.
    ///
    /// Returns `Ok(None)` when the name does not carry a descriptor.
    pub fn from_name(name: &Name) -> Result<Option<Self>, DescriptorError> {
        let Some(third) = name.get(-3) else {
            if name.components().any(looks_like_coordinates) {
                return Err(DescriptorError::TooShort(name.len()));
            }
            return Ok(None);
        };
        // get(-3) succeeded so -2 exists.
        let limit_raw = name.get(-2).unwrap_or_default();

        if looks_like_coordinates(third) {
            let target = parse_position("target", third)?;
            let limit = parse_limit(limit_raw)?;
            let source = parse_source(name.get(-4))?;
            return Ok(Some(Self {
                source,
                target,
                arrival: None,
                limit,
            }));
        }

        let Some(target_raw) = name.get(-4).filter(|raw| looks_like_coordinates(raw)) else {
            return Ok(None);
        };
        let target = parse_position("target", target_raw)?;
        let arrival = parse_arrival(third)?;
        let limit = parse_limit(limit_raw)?;
        let source = parse_source(name.get(-5))?;

        Ok(Some(Self {
            source,
            target,
            arrival: Some(arrival),
            limit,
        }))
    }

    /// Build the request name for this descriptor under `prefix`.
    pub fn append_to(&self, prefix: &Name, seq: u64) -> Name {
        let mut name = prefix.clone();
        if let Some(source) = self.source {
            name = name.append(encode_position(source));
        }
        name = name.append(encode_position(self.target));
        if let Some(arrival) = self.arrival {
            name = name.append(format!("{}", arrival.as_millis()));
        }
        name = match self.limit {
            Some(limit) => name.append(format!("{}", limit)),
            None => name.append(DEFAULT_LIMIT_MARKER),
        };
        name.append(format!("{}", seq))
    }

    /// Corridor half-width, falling back to `default`.
    #[inline]
    pub fn limit_or(&self, default: f64) -> f64 {
        self.limit.unwrap_or(default)
    }
}

fn looks_like_coordinates(raw: &str) -> bool {
    raw.contains(',') || raw.contains(ENCODED_COMMA)
}

fn encode_position(p: Position) -> String {
    format!("{}{sep}{}{sep}{}", p.x, p.y, p.z, sep = ENCODED_COMMA)
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, DescriptorError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DescriptorError::InvalidNumber {
            field,
            value: String::from(raw),
        })
}

fn parse_position(field: &'static str, raw: &str) -> Result<Position, DescriptorError> {
    let normalized = raw.replace(ENCODED_COMMA, ",");
    let mut coords = [0.0f64; 3];
    let mut found = 0usize;
    for part in normalized.split(',') {
        if found < 3 {
            coords[found] = parse_number(field, part)?;
        }
        found += 1;
    }
    if found != 3 {
        return Err(DescriptorError::CoordinateCount { field, found });
    }
    Ok(Position::new(coords[0], coords[1], coords[2]))
}

fn parse_source(raw: Option<&str>) -> Result<Option<Position>, DescriptorError> {
    match raw {
        Some(raw) if looks_like_coordinates(raw) => Ok(Some(parse_position("source", raw)?)),
        _ => Ok(None),
    }
}

fn parse_arrival(raw: &str) -> Result<Timestamp, DescriptorError> {
    raw.trim()
        .parse::<u64>()
        .map(Timestamp::from_millis)
        .map_err(|_| DescriptorError::InvalidNumber {
            field: "arrival",
            value: String::from(raw),
        })
}

fn parse_limit(raw: &str) -> Result<Option<f64>, DescriptorError> {
    if raw == DEFAULT_LIMIT_MARKER {
        return Ok(None);
    }
    let limit = parse_number("limit", raw)?;
    if limit < 0.0 {
        return Err(DescriptorError::NegativeLimit);
    }
    Ok(Some(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_descriptor() {
        let name = Name::parse("/traffic/0%2C0%2C0/1000%2C0%2C0/5000/50/7");
        let desc = RouteDescriptor::from_name(&name).unwrap().unwrap();
        assert_eq!(desc.source, Some(Position::new(0.0, 0.0, 0.0)));
        assert_eq!(desc.target, Position::new(1000.0, 0.0, 0.0));
        assert_eq!(desc.arrival, Some(Timestamp::from_millis(5000)));
        assert_eq!(desc.limit, Some(50.0));
    }

    #[test]
    fn test_parse_without_source() {
        let name = Name::parse("/traffic/1000,20,0/5000/_/7");
        let desc = RouteDescriptor::from_name(&name).unwrap().unwrap();
        assert_eq!(desc.source, None);
        assert_eq!(desc.target, Position::new(1000.0, 20.0, 0.0));
        assert_eq!(desc.limit, None);
        assert_eq!(desc.limit_or(25.0), 25.0);
    }

    #[test]
    fn test_parse_layout_without_arrival() {
        let name = Name::parse("/v2safety/8thStreet/0,0,0/700,0,0/100/3");
        let desc = RouteDescriptor::from_name(&name).unwrap().unwrap();
        assert_eq!(desc.source, Some(Position::new(0.0, 0.0, 0.0)));
        assert_eq!(desc.target, Position::new(700.0, 0.0, 0.0));
        assert_eq!(desc.arrival, None);
        assert_eq!(desc.limit, Some(100.0));

        let no_source = Name::parse("/v2safety/8thStreet/700%2C0%2C0/_/4");
        let desc = RouteDescriptor::from_name(&no_source).unwrap().unwrap();
        assert_eq!(desc.source, None);
        assert_eq!(desc.target, Position::new(700.0, 0.0, 0.0));
        assert_eq!(desc.limit, None);

        let shortest = Name::parse("/700,0,0/100/5");
        assert!(matches!(RouteDescriptor::from_name(&shortest), Ok(Some(_))));
    }

    #[test]
    fn test_layout_without_arrival_rejects_bad_fields() {
        assert_eq!(
            RouteDescriptor::from_name(&Name::parse("/v2safety/0,0,0/700,0/100/3")),
            Err(DescriptorError::CoordinateCount {
                field: "target",
                found: 2
            })
        );
        assert_eq!(
            RouteDescriptor::from_name(&Name::parse("/v2safety/0,0,0/700,0,0/-1/3")),
            Err(DescriptorError::NegativeLimit)
        );
        assert!(matches!(
            RouteDescriptor::from_name(&Name::parse("/v2safety/0,x,0/700,0,0/100/3")),
            Err(DescriptorError::InvalidNumber { field: "source", .. })
        ));
    }

    #[test]
    fn test_plain_name_has_no_descriptor() {
        assert_eq!(RouteDescriptor::from_name(&Name::parse("/video/frame/12")), Ok(None));
        assert_eq!(RouteDescriptor::from_name(&Name::parse("/a/b/c/d/e")), Ok(None));
        assert_eq!(RouteDescriptor::from_name(&Name::new()), Ok(None));
    }

    #[test]
    fn test_malformed_descriptors() {
        let bad_count = Name::parse("/p/1%2C2/5000/50/7");
        assert_eq!(
            RouteDescriptor::from_name(&bad_count),
            Err(DescriptorError::CoordinateCount {
                field: "target",
                found: 2
            })
        );

        let bad_number = Name::parse("/p/1%2Cx%2C3/5000/50/7");
        assert!(matches!(
            RouteDescriptor::from_name(&bad_number),
            Err(DescriptorError::InvalidNumber { field: "target", .. })
        ));

        let not_finite = Name::parse("/p/1,2,inf/5000/50/7");
        assert!(matches!(
            RouteDescriptor::from_name(&not_finite),
            Err(DescriptorError::InvalidNumber { .. })
        ));

        let bad_arrival = Name::parse("/p/1,2,3/soon/50/7");
        assert!(matches!(
            RouteDescriptor::from_name(&bad_arrival),
            Err(DescriptorError::InvalidNumber { field: "arrival", .. })
        ));

        let negative = Name::parse("/p/1,2,3/5000/-4/7");
        assert_eq!(
            RouteDescriptor::from_name(&negative),
            Err(DescriptorError::NegativeLimit)
        );

        let bad_source = Name::parse("/p/1,2/1,2,3/5000/4/7");
        assert!(matches!(
            RouteDescriptor::from_name(&bad_source),
            Err(DescriptorError::CoordinateCount { field: "source", .. })
        ));
    }

    #[test]
    fn test_truncated_name_with_coordinates() {
        let name = Name::parse("/1,2,3");
        assert_eq!(
            RouteDescriptor::from_name(&name),
            Err(DescriptorError::TooShort(1))
        );
        let name = Name::parse("/1,2,3/50");
        assert_eq!(
            RouteDescriptor::from_name(&name),
            Err(DescriptorError::TooShort(2))
        );
    }

    #[test]
    fn test_append_to_parses_back() {
        let desc = RouteDescriptor {
            source: Some(Position::new(-5.5, 0.0, 1.0)),
            target: Position::new(1200.0, 30.0, 0.0),
            arrival: Some(Timestamp::from_millis(9000)),
            limit: Some(40.0),
        };
        let name = desc.append_to(&Name::parse("/road/north"), 3);
        assert_eq!(name.len(), 7);
        assert_eq!(name.get(-1), Some("3"));
        assert_eq!(name.get(0), Some("road"));
        assert_eq!(RouteDescriptor::from_name(&name), Ok(Some(desc)));

        let timeless = RouteDescriptor { arrival: None, ..desc };
        let name = timeless.append_to(&Name::parse("/road/north"), 4);
        assert_eq!(name.len(), 6);
        assert_eq!(RouteDescriptor::from_name(&name), Ok(Some(timeless)));
    }
}
