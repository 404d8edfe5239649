//! Static zone and stop-line geometry shared by the rule engines.

use std::collections::HashMap;

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Zone as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub tag: String,
    /// Polygon vertices in pixel coordinates, in drawing order
    pub polygon: Vec<[f32; 2]>,
    /// Travel direction allowed inside the zone, e.g. `[0, -1]` for "up the frame"
    #[serde(default)]
    pub permitted_direction: Option<[f32; 2]>,
}

/// Line segment as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    pub tag: String,
    pub from: [f32; 2],
    pub to: [f32; 2],
}

/// Which side of a directed line a point falls on.
///
/// With `cross = (to - from) × (p - from)`, side `A` is `cross <= 0`. For a
/// left-to-right line in image coordinates that is the half above the line.
/// Points exactly on the line count as `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSide {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    tag: String,
    vertices: Vec<Point2<f32>>,
    permitted_direction: Option<Vector2<f32>>,
}

impl Zone {
    fn from_config(config: &ZoneConfig) -> Result<Self> {
        if config.polygon.len() < 3 {
            return Err(PipelineError::config(format!(
                "zone '{}' needs at least 3 vertices, got {}",
                config.tag,
                config.polygon.len()
            )));
        }
        if config.polygon.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PipelineError::config(format!(
                "zone '{}' has non-finite coordinates",
                config.tag
            )));
        }
        let vertices: Vec<Point2<f32>> = config
            .polygon
            .iter()
            .map(|[x, y]| Point2::new(*x, *y))
            .collect();
        if signed_area(&vertices).abs() < f32::EPSILON {
            return Err(PipelineError::config(format!(
                "zone '{}' has zero area",
                config.tag
            )));
        }

        let permitted_direction = match config.permitted_direction {
            Some([dx, dy]) => {
                let dir = Vector2::new(dx, dy);
                if !(dx.is_finite() && dy.is_finite()) || dir.norm() <= f32::EPSILON {
                    return Err(PipelineError::config(format!(
                        "zone '{}' permitted_direction must be a non-zero vector",
                        config.tag
                    )));
                }
                Some(dir.normalize())
            }
            None => None,
        };

        Ok(Self {
            tag: config.tag.clone(),
            vertices,
            permitted_direction,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn vertices(&self) -> &[Point2<f32>] {
        &self.vertices
    }

    /// Unit vector of the permitted travel direction, if the zone has one.
    pub fn permitted_direction(&self) -> Option<Vector2<f32>> {
        self.permitted_direction
    }

    /// Even-odd ray casting containment test.
    pub fn contains(&self, point: Point2<f32>) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if (vi.y > point.y) != (vj.y > point.y) {
                let x_cross = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
                if point.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    tag: String,
    from: Point2<f32>,
    to: Point2<f32>,
}

impl Line {
    fn from_config(config: &LineConfig) -> Result<Self> {
        let from = Point2::new(config.from[0], config.from[1]);
        let to = Point2::new(config.to[0], config.to[1]);
        if !from.coords.iter().chain(to.coords.iter()).all(|v| v.is_finite()) {
            return Err(PipelineError::config(format!(
                "line '{}' has non-finite coordinates",
                config.tag
            )));
        }
        if (to - from).norm() <= f32::EPSILON {
            return Err(PipelineError::config(format!(
                "line '{}' endpoints must be distinct",
                config.tag
            )));
        }
        Ok(Self {
            tag: config.tag.clone(),
            from,
            to,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn endpoints(&self) -> (Point2<f32>, Point2<f32>) {
        (self.from, self.to)
    }

    pub fn side_of(&self, point: Point2<f32>) -> LineSide {
        let d = self.to - self.from;
        let p = point - self.from;
        let cross = d.x * p.y - d.y * p.x;
        if cross <= 0.0 { LineSide::A } else { LineSide::B }
    }

    /// Whether `point` projects onto the segment rather than its extension.
    pub fn spans(&self, point: Point2<f32>) -> bool {
        let d = self.to - self.from;
        let t = (point - self.from).dot(&d) / d.norm_squared();
        (0.0..=1.0).contains(&t)
    }

    /// A→B transition between two consecutive positions, within the segment span.
    pub fn crossed(&self, previous: Point2<f32>, current: Point2<f32>) -> bool {
        self.side_of(previous) == LineSide::A
            && self.side_of(current) == LineSide::B
            && self.spans(current)
    }
}

/// Immutable registry of named zones and lines.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: HashMap<String, Zone>,
    lines: HashMap<String, Line>,
}

impl ZoneRegistry {
    pub fn new(zones: &[ZoneConfig], lines: &[LineConfig]) -> Result<Self> {
        let mut registry = ZoneRegistry::default();
        for config in zones {
            let zone = Zone::from_config(config)?;
            if registry.zones.insert(config.tag.clone(), zone).is_some() {
                return Err(PipelineError::config(format!(
                    "duplicate zone tag '{}'",
                    config.tag
                )));
            }
        }
        for config in lines {
            let line = Line::from_config(config)?;
            if registry.lines.insert(config.tag.clone(), line).is_some() {
                return Err(PipelineError::config(format!(
                    "duplicate line tag '{}'",
                    config.tag
                )));
            }
        }
        Ok(registry)
    }

    pub fn zone(&self, tag: &str) -> Result<&Zone> {
        self.zones
            .get(tag)
            .ok_or_else(|| PipelineError::config(format!("unknown zone tag '{tag}'")))
    }

    pub fn line(&self, tag: &str) -> Result<&Line> {
        self.lines
            .get(tag)
            .ok_or_else(|| PipelineError::config(format!("unknown line tag '{tag}'")))
    }

    pub fn contains(&self, point: Point2<f32>, zone_tag: &str) -> Result<bool> {
        Ok(self.zone(zone_tag)?.contains(point))
    }

    pub fn side_of_line(&self, point: Point2<f32>, line_tag: &str) -> Result<LineSide> {
        Ok(self.line(line_tag)?.side_of(point))
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }
}

fn signed_area(vertices: &[Point2<f32>]) -> f32 {
    let n = vertices.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    acc / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> ZoneConfig {
        ZoneConfig {
            tag: "lane".into(),
            polygon: vec![[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]],
            permitted_direction: Some([0.0, -2.0]),
        }
    }

    fn stop_line() -> LineConfig {
        LineConfig {
            tag: "stop".into(),
            from: [0.0, 50.0],
            to: [100.0, 50.0],
        }
    }

    #[test]
    fn test_contains() {
        let registry = ZoneRegistry::new(&[square()], &[]).unwrap();
        assert!(registry.contains(Point2::new(50.0, 50.0), "lane").unwrap());
        assert!(!registry.contains(Point2::new(150.0, 50.0), "lane").unwrap());
        assert!(registry.contains(Point2::new(0.0, 0.0), "missing").is_err());
    }

    #[test]
    fn test_permitted_direction_is_normalized() {
        let registry = ZoneRegistry::new(&[square()], &[]).unwrap();
        let dir = registry.zone("lane").unwrap().permitted_direction().unwrap();
        assert!((dir.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_side_of_line() {
        let registry = ZoneRegistry::new(&[], &[stop_line()]).unwrap();
        assert_eq!(registry.side_of_line(Point2::new(50.0, 10.0), "stop").unwrap(), LineSide::A);
        assert_eq!(registry.side_of_line(Point2::new(50.0, 90.0), "stop").unwrap(), LineSide::B);
        assert_eq!(registry.side_of_line(Point2::new(50.0, 50.0), "stop").unwrap(), LineSide::A);
    }

    #[test]
    fn test_crossing_requires_span_and_direction() {
        let registry = ZoneRegistry::new(&[], &[stop_line()]).unwrap();
        let line = registry.line("stop").unwrap();
        assert!(line.crossed(Point2::new(50.0, 45.0), Point2::new(50.0, 55.0)));
        assert!(!line.crossed(Point2::new(50.0, 55.0), Point2::new(50.0, 45.0)));
        assert!(!line.crossed(Point2::new(150.0, 45.0), Point2::new(150.0, 55.0)));
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let mut degenerate = square();
        degenerate.polygon = vec![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0]];
        assert!(ZoneRegistry::new(&[degenerate], &[]).is_err());

        let mut two_points = square();
        two_points.polygon.truncate(2);
        assert!(ZoneRegistry::new(&[two_points], &[]).is_err());

        let mut zero_dir = square();
        zero_dir.permitted_direction = Some([0.0, 0.0]);
        assert!(ZoneRegistry::new(&[zero_dir], &[]).is_err());

        let point_line = LineConfig {
            tag: "p".into(),
            from: [1.0, 1.0],
            to: [1.0, 1.0],
        };
        assert!(ZoneRegistry::new(&[], &[point_line]).is_err());

        assert!(ZoneRegistry::new(&[square(), square()], &[]).is_err());
    }
}
