//! Confusion matrix rendering with plotters.
//!
//! Text needs a TrueType font registered with plotters. The configured font
//! is tried first, then a few common system locations. Without any font the
//! matrix is still drawn, without labels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, FontStyle};
use robustcam_core::{ConfusionMatrix, Error, Result};
use tracing::{debug, warn};

use crate::colormap::blues;

const FONT_FAMILY: &str = "sans-serif";

const SYSTEM_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const MARGIN_LEFT: i32 = 160;
const MARGIN_RIGHT: i32 = 30;
const MARGIN_TOP: i32 = 60;
const MARGIN_BOTTOM: i32 = 80;

/// Registered plot font, re-resolved whenever a different font is requested
#[derive(Default)]
struct FontState {
    /// Last requested font and whether any font got registered for it
    active: Option<(Option<PathBuf>, bool)>,
    /// Font files read so far; `None` once a file proved unreadable or invalid
    files: HashMap<PathBuf, Option<&'static [u8]>>,
}

impl FontState {
    /// Registers the first usable candidate for `preferred`
    ///
    /// Each file is read and leaked at most once per process.
    fn resolve<F>(&mut self, preferred: Option<&Path>, mut register: F) -> bool
    where
        F: FnMut(&'static [u8]) -> bool,
    {
        let key = preferred.map(Path::to_path_buf);
        if let Some((active, ready)) = &self.active {
            if *active == key {
                return *ready;
            }
        }

        let candidates = key
            .clone()
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

        for path in candidates {
            let bytes = *self.files.entry(path.clone()).or_insert_with(|| {
                std::fs::read(&path)
                    .ok()
                    .map(|bytes| -> &'static [u8] { Box::leak(bytes.into_boxed_slice()) })
            });
            let Some(bytes) = bytes else {
                continue;
            };
            if register(bytes) {
                debug!("Plot font: {}", path.display());
                self.active = Some((key, true));
                return true;
            }
            self.files.insert(path, None);
        }

        warn!("No usable TrueType font found; plots are drawn without text");
        self.active = Some((key, false));
        false
    }
}

static FONTS: OnceLock<Mutex<FontState>> = OnceLock::new();

/// Makes a font available under [`FONT_FAMILY`]
///
/// plotters keeps one font per family for the whole process, so concurrent
/// renders asking for different fonts may draw with either.
fn ensure_font(preferred: Option<&Path>) -> bool {
    let mut state = FONTS
        .get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    state.resolve(preferred, |bytes| {
        register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok()
    })
}

fn render_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Render(e.to_string())
}

/// Side of one matrix cell in pixels
fn cell_size(num_classes: usize) -> i32 {
    (560 / num_classes.max(1) as i32).clamp(24, 120)
}

/// Writes the matrix as a PNG, overwriting `path`
///
/// Rows are actual classes, columns predicted classes. Cells are shaded by
/// count relative to the largest count and annotated with the count.
pub fn render_confusion_matrix(
    matrix: &ConfusionMatrix,
    class_names: &[String],
    noise_multiplier: f64,
    path: &Path,
    font: Option<&Path>,
) -> Result<()> {
    let n = matrix.num_classes();
    if class_names.len() != n {
        return Err(Error::InvalidArgument(format!(
            "{} class names for a {n}x{n} confusion matrix",
            class_names.len()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let cell = cell_size(n);
    let grid = cell * n as i32;
    let width = (MARGIN_LEFT + grid + MARGIN_RIGHT) as u32;
    let height = (MARGIN_TOP + grid + MARGIN_BOTTOM) as u32;

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let max_count = matrix.max_count().max(1) as f64;
    for actual in 0..n {
        for predicted in 0..n {
            let intensity = matrix.get(actual, predicted) as f64 / max_count;
            let (r, g, b) = blues(intensity);
            let x0 = MARGIN_LEFT + predicted as i32 * cell;
            let y0 = MARGIN_TOP + actual as i32 * cell;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                RGBColor(r, g, b).filled(),
            ))
            .map_err(render_error)?;
        }
    }
    root.draw(&Rectangle::new(
        [(MARGIN_LEFT, MARGIN_TOP), (MARGIN_LEFT + grid, MARGIN_TOP + grid)],
        BLACK.stroke_width(1),
    ))
    .map_err(render_error)?;

    if ensure_font(font) {
        draw_labels(&root, matrix, class_names, noise_multiplier, cell, width)?;
    }

    root.present().map_err(render_error)?;
    debug!("Confusion matrix written to {}", path.display());
    Ok(())
}

fn draw_labels<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    matrix: &ConfusionMatrix,
    class_names: &[String],
    noise_multiplier: f64,
    cell: i32,
    width: u32,
) -> Result<()> {
    let n = matrix.num_classes();
    let grid = cell * n as i32;
    let center = Pos::new(HPos::Center, VPos::Center);
    let max_count = matrix.max_count().max(1) as f64;
    let count_size = (cell / 3).clamp(10, 20);

    root.draw(&Text::new(
        format!("Confusion Matrix (Noise Multiplier: {noise_multiplier})"),
        (width as i32 / 2, MARGIN_TOP / 2),
        (FONT_FAMILY, 20).into_font().color(&BLACK).pos(center),
    ))
    .map_err(render_error)?;

    for actual in 0..n {
        for predicted in 0..n {
            let count = matrix.get(actual, predicted);
            let color = if count as f64 / max_count > 0.5 {
                WHITE
            } else {
                BLACK
            };
            let x = MARGIN_LEFT + predicted as i32 * cell + cell / 2;
            let y = MARGIN_TOP + actual as i32 * cell + cell / 2;
            root.draw(&Text::new(
                count.to_string(),
                (x, y),
                (FONT_FAMILY, count_size).into_font().color(&color).pos(center),
            ))
            .map_err(render_error)?;
        }
    }

    for (i, name) in class_names.iter().enumerate() {
        let offset = i as i32 * cell + cell / 2;
        root.draw(&Text::new(
            name.clone(),
            (MARGIN_LEFT - 8, MARGIN_TOP + offset),
            (FONT_FAMILY, 13)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Right, VPos::Center)),
        ))
        .map_err(render_error)?;
        root.draw(&Text::new(
            name.clone(),
            (MARGIN_LEFT + offset, MARGIN_TOP + grid + 8),
            (FONT_FAMILY, 13)
                .into_font()
                .color(&BLACK)
                .pos(Pos::new(HPos::Center, VPos::Top)),
        ))
        .map_err(render_error)?;
    }

    root.draw(&Text::new(
        "Predicted",
        (MARGIN_LEFT + grid / 2, MARGIN_TOP + grid + MARGIN_BOTTOM - 25),
        (FONT_FAMILY, 16).into_font().color(&BLACK).pos(center),
    ))
    .map_err(render_error)?;
    root.draw(&Text::new(
        "Actual",
        (18, MARGIN_TOP + grid / 2),
        (FONT_FAMILY, 16)
            .into_font()
            .transform(FontTransform::Rotate270)
            .color(&BLACK)
            .pos(center),
    ))
    .map_err(render_error)?;

    Ok(())
}
