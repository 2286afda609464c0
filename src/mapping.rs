use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::core::Canvas;
use crate::error::{LipwaveError, LipwaveResult};
use crate::timeline::{Label, Timeline};

/// Decoded raster overlay in premultiplied RGBA8 form.
///
/// Loaded once at table-construction time and shared read-only across
/// render workers.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl PreparedImage {
    /// Canvas dimensions of this image.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }
}

/// Decode an image file into premultiplied RGBA8.
pub fn load_image(path: &Path) -> LipwaveResult<PreparedImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read image '{}'", path.display()))
        .map_err(|e| LipwaveError::mapping(format!("{e:#}")))?;
    let dyn_img = image::load_from_memory(&bytes)
        .with_context(|| format!("decode image '{}'", path.display()))
        .map_err(|e| LipwaveError::mapping(format!("{e:#}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Label-to-image lookup table, read-only after construction.
///
/// Built from tabular text with one `label,image-path` row per line; image
/// paths are resolved relative to the table file's directory. Every image is
/// decoded up front so rendering never performs I/O.
#[derive(Clone, Debug)]
pub struct MappingTable {
    images: BTreeMap<Label, PreparedImage>,
    source: PathBuf,
}

impl MappingTable {
    /// Load and validate a mapping table from `path`.
    ///
    /// Fails with [`LipwaveError::Mapping`] on a malformed row, a duplicated
    /// label, or an image that cannot be read or decoded.
    pub fn load(path: &Path) -> LipwaveResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read mapping table '{}'", path.display()))
            .map_err(|e| LipwaveError::mapping(format!("{e:#}")))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut images = BTreeMap::new();
        for (line_no, line) in text.lines().enumerate() {
            let row = line_no + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((raw_label, raw_file)) = line.split_once(',') else {
                return Err(LipwaveError::mapping(format!(
                    "{}:{row}: expected 'label,image-path', got '{line}'",
                    path.display()
                )));
            };
            let raw_label = raw_label.trim();
            let raw_file = raw_file.trim();
            if raw_file.is_empty() {
                return Err(LipwaveError::mapping(format!(
                    "{}:{row}: missing image path for label '{raw_label}'",
                    path.display()
                )));
            }

            let label = Label::parse(raw_label).map_err(|_| {
                LipwaveError::mapping(format!(
                    "{}:{row}: invalid label '{raw_label}' (single uppercase letter expected)",
                    path.display()
                ))
            })?;
            if images.contains_key(&label) {
                return Err(LipwaveError::mapping(format!(
                    "{}:{row}: duplicate label '{label}'",
                    path.display()
                )));
            }

            let image_path = dir.join(raw_file);
            let image = load_image(&image_path).map_err(|e| match e {
                LipwaveError::Mapping(msg) => LipwaveError::mapping(format!(
                    "{}:{row}: label '{label}': {msg}",
                    path.display()
                )),
                other => other,
            })?;
            images.insert(label, image);
        }

        if images.is_empty() {
            return Err(LipwaveError::mapping(format!(
                "mapping table '{}' contains no rows",
                path.display()
            )));
        }

        Ok(Self {
            images,
            source: path.to_path_buf(),
        })
    }

    /// Resolve `label` to its image.
    pub fn resolve(&self, label: Label) -> LipwaveResult<&PreparedImage> {
        self.images.get(&label).ok_or_else(|| {
            LipwaveError::unknown_label(format!(
                "label '{label}' is not present in mapping table '{}'",
                self.source.display()
            ))
        })
    }

    /// Return `true` when `label` has a mapping.
    pub fn contains(&self, label: Label) -> bool {
        self.images.contains_key(&label)
    }

    /// Labels present in the table, in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.images.keys().copied()
    }

    /// Dimensions of the first image in label order, if any.
    pub fn first_canvas(&self) -> Option<Canvas> {
        self.images.values().next().map(PreparedImage::canvas)
    }

    /// Check that every label the timeline references is mapped.
    ///
    /// Runs before the first frame is produced so an authoring defect fails
    /// the whole render up front instead of partway through.
    pub fn validate_covers(&self, timeline: &Timeline, what: &str) -> LipwaveResult<()> {
        for event in timeline.events() {
            if !self.contains(event.label) {
                return Err(LipwaveError::unknown_label(format!(
                    "{what} timeline references label '{}' absent from '{}'",
                    event.label,
                    self.source.display()
                )));
            }
        }
        Ok(())
    }

    /// Check that every image matches the output canvas exactly.
    pub fn validate_dimensions(&self, canvas: Canvas) -> LipwaveResult<()> {
        for (label, image) in &self.images {
            if image.canvas() != canvas {
                return Err(LipwaveError::dimension_mismatch(format!(
                    "'{}': label '{label}' is {}x{}, canvas is {}x{}",
                    self.source.display(),
                    image.width,
                    image.height,
                    canvas.width,
                    canvas.height
                )));
            }
        }
        Ok(())
    }

    /// Path the table was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }
}
