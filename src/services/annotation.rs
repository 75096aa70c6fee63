//! Free-hand markings an evaluator draws over scanned answer pages.
//!
//! One [`AnnotationSession`] per page, held by index in an
//! [`AnnotationBoard`]. Sessions live in memory only; nothing is persisted
//! until the evaluation coordinator stores the rendered pages.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::EvaluationSettings;
use crate::db::models::Submission;

/// Coordinates beyond this are rejected so a single stroke cannot make
/// rendering unbounded.
const MAX_COORDINATE: f32 = 65_535.0;
const MAX_BRUSH_WIDTH: f32 = 200.0;
const DEFAULT_COLOR: [u8; 4] = [220, 38, 38, 255];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct Point {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Stroke {
    pub(crate) points: Vec<Point>,
    #[serde(default = "default_color")]
    pub(crate) color: [u8; 4],
    #[serde(default)]
    pub(crate) width: Option<f32>,
}

fn default_color() -> [u8; 4] {
    DEFAULT_COLOR
}

#[derive(Debug, Error)]
pub(crate) enum AnnotationError {
    #[error("page {page} is read-only because the submission is already evaluated")]
    ReadOnly { page: usize },
    #[error("page {page} does not exist; submission has {pages} page(s)")]
    PageOutOfRange { page: usize, pages: usize },
    #[error("stroke has no points")]
    EmptyStroke,
    #[error("stroke point ({x}, {y}) is outside the drawable area")]
    InvalidPoint { x: f32, y: f32 },
    #[error("brush width {0} is not supported")]
    InvalidWidth(f32),
    #[error("page already holds the maximum of {limit} strokes")]
    TooManyStrokes { limit: usize },
    #[error("failed to render page: {0}")]
    Render(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AnnotationLimits {
    pub(crate) max_strokes: usize,
    pub(crate) default_width: f32,
}

impl From<&EvaluationSettings> for AnnotationLimits {
    fn from(settings: &EvaluationSettings) -> Self {
        Self {
            max_strokes: settings.max_strokes_per_page,
            default_width: settings.default_brush_width,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AnnotationSession {
    page: usize,
    strokes: Vec<Stroke>,
    read_only: bool,
    limits: AnnotationLimits,
}

impl AnnotationSession {
    pub(crate) fn new(page: usize, limits: AnnotationLimits) -> Self {
        Self { page, strokes: Vec::new(), read_only: false, limits }
    }

    pub(crate) fn page(&self) -> usize {
        self.page
    }

    pub(crate) fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub(crate) fn has_marks(&self) -> bool {
        !self.strokes.is_empty()
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn add_stroke(&mut self, stroke: Stroke) -> Result<(), AnnotationError> {
        self.ensure_writable()?;

        if stroke.points.is_empty() {
            return Err(AnnotationError::EmptyStroke);
        }
        if let Some(point) = stroke.points.iter().find(|point| !point_in_range(point)) {
            return Err(AnnotationError::InvalidPoint { x: point.x, y: point.y });
        }
        if let Some(width) = stroke.width {
            if !width.is_finite() || width <= 0.0 || width > MAX_BRUSH_WIDTH {
                return Err(AnnotationError::InvalidWidth(width));
            }
        }
        if self.strokes.len() >= self.limits.max_strokes {
            return Err(AnnotationError::TooManyStrokes { limit: self.limits.max_strokes });
        }

        self.strokes.push(stroke);
        Ok(())
    }

    /// Removes the most recent stroke.
    pub(crate) fn undo(&mut self) -> Result<Option<Stroke>, AnnotationError> {
        self.ensure_writable()?;
        Ok(self.strokes.pop())
    }

    pub(crate) fn clear(&mut self) -> Result<(), AnnotationError> {
        self.ensure_writable()?;
        self.strokes.clear();
        Ok(())
    }

    /// Composites the strokes over `source` and encodes the result as PNG.
    /// A session without strokes renders the page unchanged.
    pub(crate) fn finalize(&self, source: &[u8]) -> Result<Vec<u8>, AnnotationError> {
        let mut canvas = image::load_from_memory(source)?.to_rgba8();

        for stroke in &self.strokes {
            let width = stroke.width.unwrap_or(self.limits.default_width);
            draw_stroke(&mut canvas, stroke, width);
        }

        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas).write_to(&mut encoded, ImageFormat::Png)?;
        Ok(encoded.into_inner())
    }

    fn ensure_writable(&self) -> Result<(), AnnotationError> {
        if self.read_only {
            Err(AnnotationError::ReadOnly { page: self.page })
        } else {
            Ok(())
        }
    }
}

/// Every answer page of one submission, indexed by page position.
#[derive(Debug, Clone)]
pub(crate) struct AnnotationBoard {
    sessions: Vec<AnnotationSession>,
}

impl AnnotationBoard {
    pub(crate) fn new(pages: usize, limits: AnnotationLimits) -> Self {
        Self { sessions: (0..pages).map(|page| AnnotationSession::new(page, limits)).collect() }
    }

    /// Opens a board for `submission`; read-only once it is evaluated.
    pub(crate) fn for_submission(submission: &Submission, limits: AnnotationLimits) -> Self {
        let mut board = Self::new(submission.answer_images.0.len(), limits);
        if submission.is_evaluated {
            board.lock();
        }
        board
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.sessions.iter().any(AnnotationSession::is_read_only)
    }

    pub(crate) fn has_marks(&self) -> bool {
        self.sessions.iter().any(AnnotationSession::has_marks)
    }

    pub(crate) fn lock(&mut self) {
        for session in &mut self.sessions {
            session.read_only = true;
        }
    }

    pub(crate) fn page(&self, page: usize) -> Result<&AnnotationSession, AnnotationError> {
        let pages = self.sessions.len();
        self.sessions.get(page).ok_or(AnnotationError::PageOutOfRange { page, pages })
    }

    pub(crate) fn page_mut(&mut self, page: usize) -> Result<&mut AnnotationSession, AnnotationError> {
        let pages = self.sessions.len();
        self.sessions.get_mut(page).ok_or(AnnotationError::PageOutOfRange { page, pages })
    }

    pub(crate) fn sessions(&self) -> impl Iterator<Item = &AnnotationSession> {
        self.sessions.iter()
    }

    /// Replaces the strokes of page `i` with `pages[i]`. Pages without an
    /// entry keep what they hold; a page whose strokes fail validation is
    /// left unmarked.
    pub(crate) fn apply(&mut self, pages: Vec<Vec<Stroke>>) -> Result<(), AnnotationError> {
        let available = self.sessions.len();
        if pages.len() > available {
            return Err(AnnotationError::PageOutOfRange { page: pages.len() - 1, pages: available });
        }

        for (index, strokes) in pages.into_iter().enumerate() {
            let session = self.page_mut(index)?;
            session.clear()?;
            let mut added = 0;
            for stroke in strokes {
                if let Err(err) = session.add_stroke(stroke) {
                    for _ in 0..added {
                        session.undo()?;
                    }
                    return Err(err);
                }
                added += 1;
            }
        }

        Ok(())
    }
}

fn point_in_range(point: &Point) -> bool {
    point.x.is_finite()
        && point.y.is_finite()
        && point.x.abs() <= MAX_COORDINATE
        && point.y.abs() <= MAX_COORDINATE
}

/// Stamps brush discs along each segment of the stroke.
fn draw_stroke(canvas: &mut RgbaImage, stroke: &Stroke, width: f32) {
    let radius = ((width / 2.0).round() as i32).max(1);
    let spacing = (radius as f32 / 2.0).max(1.0);
    let color = Rgba(stroke.color);

    let mut stamp = |x: f32, y: f32| {
        draw_filled_circle_mut(canvas, (x.round() as i32, y.round() as i32), radius, color);
    };

    let Some(first) = stroke.points.first() else {
        return;
    };
    stamp(first.x, first.y);

    for segment in stroke.points.windows(2) {
        let (from, to) = (segment[0], segment[1]);
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        let steps = ((dx.hypot(dy) / spacing).ceil() as usize).max(1);
        for step in 1..=steps {
            let t = step as f32 / steps as f32;
            stamp(from.x + dx * t, from.y + dy * t);
        }
    }
}
