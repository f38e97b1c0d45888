//! Printable label artifacts: a one-page PDF carrying the file's display
//! name, its `project / section / file` breadcrumb, its tags, and a QR code
//! for the permanent download URL.

mod metrics;

use std::io::Write;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

pub use metrics::{Face, text_width};

/// US Letter, in points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

const TITLE_SIZE: f32 = 48.0;
const BREADCRUMB_SIZE: f32 = 20.0;
const TAGS_SIZE: f32 = 20.0;
const URL_SIZE: f32 = 12.0;
const QR_SIDE: f32 = 250.0;
const SIDE_MARGIN: f32 = 36.0;
const MIN_TEXT_SIZE: f32 = 6.0;
/// Distance from the top of a line to its baseline, as a fraction of the size.
const ASCENT: f32 = 0.718;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Label task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything printed on a label.
#[derive(Debug, Clone)]
pub struct LabelContent {
    pub url: String,
    pub display_name: String,
    pub project_name: String,
    pub section_name: String,
    pub tags: Vec<String>,
}

impl LabelContent {
    pub fn breadcrumb(&self) -> String {
        format!(
            "{} / {} / {}",
            self.project_name, self.section_name, self.display_name
        )
    }
}

/// One line of text positioned on the page. `top` is measured from the top
/// edge, `x` from the left edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub face: Face,
    pub size: f32,
    pub x: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLayout {
    pub lines: Vec<TextLine>,
    /// Left edge and top edge of the QR block.
    pub qr_x: f32,
    pub qr_top: f32,
    pub qr_side: f32,
}

/// Horizontally centred line, shrunk until it fits between the margins.
fn centered(text: &str, face: Face, preferred: f32, top: f32) -> TextLine {
    let max_width = PAGE_WIDTH - 2.0 * SIDE_MARGIN;
    let mut size = preferred;
    let natural = text_width(text, face, preferred);
    if natural > max_width {
        size = (preferred * max_width / natural).max(MIN_TEXT_SIZE);
    }
    let width = text_width(text, face, size);
    TextLine {
        text: text.to_string(),
        face,
        size,
        x: ((PAGE_WIDTH - width) / 2.0).max(0.0),
        top,
    }
}

pub fn layout(content: &LabelContent) -> LabelLayout {
    let title_top = 50.0;
    let breadcrumb_top = title_top + 100.0;
    let tags_top = breadcrumb_top + 70.0;

    let mut lines = vec![
        centered(&content.display_name, Face::Bold, TITLE_SIZE, title_top),
        centered(&content.breadcrumb(), Face::Regular, BREADCRUMB_SIZE, breadcrumb_top),
    ];
    if !content.tags.is_empty() {
        lines.push(centered(&content.tags.join(", "), Face::Regular, TAGS_SIZE, tags_top));
    }

    let qr_x = (PAGE_WIDTH - QR_SIDE) / 2.0;
    let qr_top = (PAGE_HEIGHT - QR_SIDE) / 2.0;
    lines.push(centered(&content.url, Face::Regular, URL_SIZE, qr_top + QR_SIDE + 70.0));

    LabelLayout {
        lines,
        qr_x,
        qr_top,
        qr_side: QR_SIDE,
    }
}

/// Rasterise `payload` as a QR code at error-correction level H, one pixel
/// per module, quiet zone included.
pub fn qr_image(payload: &str) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>, LabelError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)?;
    Ok(code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .module_dimensions(1, 1)
        .build())
}

/// Render the label PDF into memory.
pub fn generate_label(content: &LabelContent) -> Result<Vec<u8>, LabelError> {
    let qr = qr_image(&content.url)?;
    let layout = layout(content);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary(Face::Regular));
    let bold_id = doc.add_object(font_dictionary(Face::Bold));

    let (qr_width, qr_height) = qr.dimensions();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => qr_width as i64,
            "Height" => qr_height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Interpolate" => false,
        },
        qr.into_raw(),
    ));

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Face::Regular.resource_name() => regular_id,
            Face::Bold.resource_name() => bold_id,
        },
        "XObject" => dictionary! {
            "Qr" => image_id,
        },
    });

    let content_id = doc.add_object(Stream::new(dictionary! {}, page_operations(&layout).encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn real(value: f32) -> Object {
    value.into()
}

fn font_dictionary(face: Face) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => face.base_font(),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn page_operations(layout: &LabelLayout) -> Content {
    let mut operations = Vec::new();
    for line in &layout.lines {
        let baseline = PAGE_HEIGHT - line.top - line.size * ASCENT;
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![line.face.resource_name().into(), real(line.size)],
            ),
            Operation::new("Td", vec![real(line.x), real(baseline)]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    metrics::win_ansi_bytes(&line.text),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    let qr_bottom = PAGE_HEIGHT - layout.qr_top - layout.qr_side;
    operations.extend([
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(layout.qr_side),
                0.into(),
                0.into(),
                real(layout.qr_side),
                real(layout.qr_x),
                real(qr_bottom),
            ],
        ),
        Operation::new("Do", vec!["Qr".into()]),
        Operation::new("Q", vec![]),
    ]);

    Content { operations }
}

/// Render a label and write it to `path` atomically: the PDF is built in a
/// temporary file next to the target and renamed into place, so a failed
/// render never leaves a partial file behind.
pub async fn write_label(path: PathBuf, content: LabelContent) -> Result<PathBuf, LabelError> {
    tokio::task::spawn_blocking(move || {
        let bytes = generate_label(&content)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| LabelError::Io(e.error))?;
        Ok(path)
    })
    .await
    .map_err(|e| LabelError::Task(e.to_string()))?
}
