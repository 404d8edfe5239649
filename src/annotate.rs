//! Draws tracks, violations and static geometry onto a copy of the frame.

use std::fs;
use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect as PixelRect;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::events::ViolationEvent;
use crate::light::{LightState, SignalPhase};
use crate::tracker::{ObjectClass, Rect, Track};
use crate::zones::ZoneRegistry;

const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const ZONE_COLOR: Rgb<u8> = Rgb([0, 200, 200]);
const TEXT_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Outline zones and draw stop lines in the current light color
    pub draw_zones: bool,
    pub box_thickness: u32,
    /// Label height in pixels
    pub text_scale: f32,
    /// TrueType/OpenType font for track ids and violation labels.
    /// Without one, boxes and markers are drawn but no text.
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            draw_zones: true,
            box_thickness: 2,
            text_scale: 16.0,
            font_path: None,
        }
    }
}

impl AnnotatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.box_thickness == 0 {
            return Err(PipelineError::config("annotator.box_thickness must be positive"));
        }
        if !(self.text_scale > 0.0 && self.text_scale.is_finite()) {
            return Err(PipelineError::config(format!(
                "annotator.text_scale must be positive, got {}",
                self.text_scale
            )));
        }
        Ok(())
    }
}

pub struct Annotator {
    config: AnnotatorConfig,
    font: Option<FontVec>,
    zones: Vec<Vec<Point2<f32>>>,
    lines: Vec<(Point2<f32>, Point2<f32>)>,
}

impl Annotator {
    /// Collect the registry geometry and load the label font, if configured.
    pub fn new(config: AnnotatorConfig, registry: &ZoneRegistry) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = fs::read(path)?;
                let font = FontVec::try_from_vec(bytes).map_err(|err| {
                    PipelineError::config(format!(
                        "annotator.font_path {}: {err}",
                        path.display()
                    ))
                })?;
                Some(font)
            }
            None => None,
        };

        let mut zones: Vec<(String, Vec<Point2<f32>>)> = registry
            .zones()
            .map(|z| (z.tag().to_string(), z.vertices().to_vec()))
            .collect();
        let mut lines: Vec<(String, (Point2<f32>, Point2<f32>))> = registry
            .lines()
            .map(|l| (l.tag().to_string(), l.endpoints()))
            .collect();
        // Registry iteration order is arbitrary; keep drawing order stable.
        zones.sort_by(|a, b| a.0.cmp(&b.0));
        lines.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self {
            config,
            font,
            zones: zones.into_iter().map(|(_, v)| v).collect(),
            lines: lines.into_iter().map(|(_, l)| l).collect(),
        })
    }

    /// Render onto a new buffer of the same size. `frame` is left untouched.
    ///
    /// `tracks` are all active tracks, stale ones included.
    pub fn render(
        &self,
        frame: &RgbImage,
        tracks: &[Track],
        events: &[ViolationEvent],
        light: &LightState,
    ) -> RgbImage {
        let mut out = frame.clone();
        let thickness = self.config.box_thickness;
        let scale = PxScale::from(self.config.text_scale);

        if self.config.draw_zones {
            for polygon in &self.zones {
                for (i, a) in polygon.iter().enumerate() {
                    let b = polygon[(i + 1) % polygon.len()];
                    draw_thick_line(&mut out, *a, b, ZONE_COLOR, 1);
                }
            }
            let line_color = phase_color(light.phase);
            for (a, b) in &self.lines {
                draw_thick_line(&mut out, *a, *b, line_color, thickness);
            }
        }

        for track in tracks {
            let rect = track.rect();
            let color = class_color(track.class);
            draw_box(&mut out, &rect, color, thickness);
            if let Some(font) = &self.font {
                let label = format!("#{}", track.track_id);
                let (_, h) = text_size(scale, font, &label);
                let top = rect.y.round() as i32 - h as i32 - 1;
                draw_text_mut(&mut out, color, rect.x.round() as i32, top, scale, font, &label);
            }
        }

        for event in events {
            let rect = event.evidence.bbox;
            draw_box(&mut out, &rect, VIOLATION_COLOR, thickness * 2);
            if let Some(secondary) = event.evidence.secondary_bbox {
                draw_box(&mut out, &secondary, VIOLATION_COLOR, 1);
            }
            if let Some(font) = &self.font {
                let label = event.kind.label();
                let (w, h) = text_size(scale, font, label);
                let x = rect.x.round() as i32;
                let y = rect.bottom().round() as i32 + (thickness * 2) as i32 + 1;
                draw_filled_rect_mut(
                    &mut out,
                    PixelRect::at(x - 1, y - 1).of_size(w + 2, h + 2),
                    TEXT_BACKGROUND,
                );
                draw_text_mut(&mut out, VIOLATION_COLOR, x, y, scale, font, label);
            }
        }

        out
    }
}

fn class_color(class: ObjectClass) -> Rgb<u8> {
    match class {
        ObjectClass::Vehicle => Rgb([0, 128, 255]),
        ObjectClass::Motorcycle => Rgb([255, 160, 0]),
        ObjectClass::Rider | ObjectClass::Person => Rgb([160, 255, 0]),
        _ => Rgb([255, 255, 255]),
    }
}

fn phase_color(phase: SignalPhase) -> Rgb<u8> {
    match phase {
        SignalPhase::Red => Rgb([255, 0, 0]),
        SignalPhase::Yellow => Rgb([255, 220, 0]),
        SignalPhase::Green => Rgb([0, 255, 0]),
        SignalPhase::Unknown => Rgb([255, 255, 255]),
    }
}

/// Pixel rectangle covering `rect`, or None when it rounds to nothing.
fn pixel_rect(rect: &Rect) -> Option<PixelRect> {
    let width = rect.width.round();
    let height = rect.height.round();
    (width >= 1.0 && height >= 1.0).then(|| {
        PixelRect::at(rect.x.round() as i32, rect.y.round() as i32)
            .of_size(width as u32, height as u32)
    })
}

/// Outline drawn inward from the box edges.
fn draw_box(img: &mut RgbImage, rect: &Rect, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness {
        let d = inset as f32;
        let inner = Rect::new(rect.x + d, rect.y + d, rect.width - 2.0 * d, rect.height - 2.0 * d);
        match pixel_rect(&inner) {
            Some(px) => draw_hollow_rect_mut(img, px, color),
            None => break,
        }
    }
}

/// Parallel one-pixel segments, offset across the line's major axis.
fn draw_thick_line(img: &mut RgbImage, a: Point2<f32>, b: Point2<f32>, color: Rgb<u8>, thickness: u32) {
    let steep = (b.y - a.y).abs() > (b.x - a.x).abs();
    let half = thickness as i32 / 2;
    for k in -half..thickness as i32 - half {
        let o = k as f32;
        let (start, end) = if steep {
            ((a.x + o, a.y), (b.x + o, b.y))
        } else {
            ((a.x, a.y + o), (b.x, b.y + o))
        };
        draw_line_segment_mut(img, start, end, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Evidence, ViolationKind};
    use crate::tracker::Detection;
    use crate::zones::LineConfig;

    fn track() -> Track {
        let det = Detection::from_rect(Rect::new(20.0, 30.0, 40.0, 40.0), ObjectClass::Vehicle, 0.9);
        Track::new(7, &det, 0, 5)
    }

    #[test]
    fn test_input_untouched_and_size_kept() {
        let frame = RgbImage::new(120, 100);
        let annotator = Annotator::new(AnnotatorConfig::default(), &ZoneRegistry::default()).unwrap();
        let out = annotator.render(&frame, &[track()], &[], &LightState::default());
        assert_eq!(out.dimensions(), frame.dimensions());
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
        assert_eq!(*out.get_pixel(20, 30), class_color(ObjectClass::Vehicle));
        assert_eq!(*out.get_pixel(40, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_violation_marker_drawn() {
        let frame = RgbImage::new(120, 100);
        let annotator = Annotator::new(AnnotatorConfig::default(), &ZoneRegistry::default()).unwrap();
        let event = ViolationEvent {
            track_id: 7,
            kind: ViolationKind::RedLight,
            frame_index: 0,
            evidence: Evidence {
                bbox: Rect::new(20.0, 30.0, 40.0, 40.0),
                secondary_bbox: None,
                secondary_track_id: None,
            },
            confidence: 0.9,
        };
        let out = annotator.render(&frame, &[track()], &[event], &LightState::default());
        // Thick violation border overrides the class-colored track box.
        assert_eq!(*out.get_pixel(22, 32), VIOLATION_COLOR);
    }

    #[test]
    fn test_stop_line_uses_light_color() {
        let line = LineConfig {
            tag: "stop".into(),
            from: [0.0, 50.0],
            to: [99.0, 50.0],
        };
        let registry = ZoneRegistry::new(&[], &[line]).unwrap();
        let annotator = Annotator::new(AnnotatorConfig::default(), &registry).unwrap();
        let light = LightState {
            phase: SignalPhase::Red,
            last_change_frame: Some(0),
            debounce_counter: 0,
        };
        let out = annotator.render(&RgbImage::new(100, 100), &[], &[], &light);
        assert_eq!(*out.get_pixel(60, 50), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_box_thickness_and_degenerate_boxes() {
        let mut img = RgbImage::new(50, 50);
        draw_box(&mut img, &Rect::new(10.0, 10.0, 20.0, 20.0), Rgb([9, 9, 9]), 3);
        assert_eq!(*img.get_pixel(12, 20), Rgb([9, 9, 9]));
        assert_eq!(*img.get_pixel(13, 20), Rgb([0, 0, 0]));

        let mut img = RgbImage::new(50, 50);
        draw_box(&mut img, &Rect::new(10.0, 10.0, 0.2, 20.0), Rgb([9, 9, 9]), 2);
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let config = AnnotatorConfig {
            font_path: Some("/nonexistent/label-font.ttf".into()),
            ..AnnotatorConfig::default()
        };
        assert!(matches!(
            Annotator::new(config, &ZoneRegistry::default()),
            Err(PipelineError::Io(_))
        ));
    }

    #[test]
    fn test_not_a_font_is_rejected() {
        let path = std::env::temp_dir().join("tvdr-not-a-font.ttf");
        fs::write(&path, b"definitely not a font").unwrap();
        let config = AnnotatorConfig {
            font_path: Some(path.clone()),
            ..AnnotatorConfig::default()
        };
        let result = Annotator::new(config, &ZoneRegistry::default());
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }
}
