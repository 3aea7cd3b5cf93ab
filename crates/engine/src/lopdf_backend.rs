//! Pure-Rust document backend on top of `lopdf`.
//!
//! Page sizes come from the (possibly inherited) media boxes. Text positions
//! are recovered by interpreting the text operators of each content stream;
//! glyph widths are estimated from the font size since no font metrics are
//! loaded. Rasterisation draws a greeked proxy of the page: paper, a border
//! and a bar for every text run.

use crate::backend::{DocumentBackend, EngineError, EngineResult};
use crate::geometry::{PageSize, Rect};
use crate::pixels::{PixelBuffer, RenderMode};
use crate::text::{StructuredTextPage, TextLine, TextRun};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::fs;
use std::path::Path;

/// How far up the page tree a media box is looked up.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Average glyph advance as a fraction of the font size.
const AVERAGE_ADVANCE_EM: f32 = 0.55;

/// Ascent as a fraction of the font size.
const ASCENT_EM: f32 = 0.8;

const BORDER_COLOR: [u8; 4] = [200, 200, 200, 255];

#[derive(Debug, Clone, Copy)]
struct PageRecord {
    id: ObjectId,
    size: PageSize,
}

/// Document backend reading PDFs with `lopdf`.
pub struct LopdfBackend {
    document: Document,
    pages: Vec<PageRecord>,
}

impl LopdfBackend {
    /// Open a PDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Parse a PDF held in memory.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(EngineError::EncryptedUnsupported);
        }

        let document = Document::load_mem(bytes)?;
        let pages: Vec<PageRecord> = document
            .get_pages()
            .into_values()
            .map(|id| PageRecord {
                id,
                size: media_box(&document, id).unwrap_or(PageSize::LETTER),
            })
            .collect();

        if pages.is_empty() {
            return Err(EngineError::EmptyDocument);
        }

        log::debug!("opened PDF with {} pages", pages.len());
        Ok(Self { document, pages })
    }

    fn record(&self, page: usize) -> EngineResult<PageRecord> {
        self.pages
            .get(page)
            .copied()
            .ok_or(EngineError::PageOutOfRange { page, page_count: self.pages.len() })
    }
}

impl DocumentBackend for LopdfBackend {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> EngineResult<PageSize> {
        Ok(self.record(page)?.size)
    }

    fn render_page(&self, page: usize, scale: f32, mode: RenderMode) -> EngineResult<PixelBuffer> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(EngineError::InvalidScale(scale));
        }

        let size = self.record(page)?.size;
        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;

        let mut pixels = PixelBuffer::filled(width, height, mode.paper())?;

        if width >= 4 && height >= 4 {
            let (w, h) = (width as i64, height as i64);
            pixels.fill_rect(0, 0, w, 1, BORDER_COLOR);
            pixels.fill_rect(0, h - 1, w, h, BORDER_COLOR);
            pixels.fill_rect(0, 0, 1, h, BORDER_COLOR);
            pixels.fill_rect(w - 1, 0, w, h, BORDER_COLOR);
        }

        // Greeking is best effort; a page whose text cannot be read still renders.
        match self.extract_structured_text(page) {
            Ok(text) => {
                let ink = mode.ink();
                for run in text.lines.iter().flat_map(|line| line.runs.iter()) {
                    let bar = run.bbox.scale(scale, scale);
                    pixels.fill_rect(
                        bar.x.floor() as i64,
                        (bar.y + bar.height * 0.3).floor() as i64,
                        bar.right().ceil() as i64,
                        (bar.y + bar.height * 0.8).ceil() as i64,
                        ink,
                    );
                }
            }
            Err(err) => log::debug!("page {page}: rendering without text proxy: {err}"),
        }

        Ok(pixels)
    }

    fn extract_structured_text(&self, page: usize) -> EngineResult<StructuredTextPage> {
        let record = self.record(page)?;
        let raw = self.document.get_page_content(record.id)?;
        let content = Content::decode(&raw)?;

        let mut interpreter = TextInterpreter::new(record.size.height);
        for operation in &content.operations {
            interpreter.apply(&operation.operator, &operation.operands);
        }

        Ok(interpreter.finish())
    }

    fn close(&self) {
        log::debug!("closing PDF with {} pages", self.pages.len());
    }
}

fn media_box(document: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut current = Some(page_id);

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = document.get_dictionary(current?).ok()?;

        if let Some(size) = dict.get(b"MediaBox").ok().and_then(|obj| parse_box(document, obj)) {
            return Some(size);
        }

        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

fn parse_box(document: &Document, obj: &Object) -> Option<PageSize> {
    let obj = match obj {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };

    let array = obj.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    let size = PageSize::new((x1 - x0).abs(), (y1 - y0).abs());
    (size.width > 0.0 && size.height > 0.0).then_some(size)
}

/// Word positioned on a baseline, before line grouping.
struct PlacedWord {
    baseline: f32,
    font_size: f32,
    run: TextRun,
}

/// Minimal text-state machine over content stream operators.
struct TextInterpreter {
    page_height: f32,
    font_size: f32,
    leading: f32,
    // [a b c d e f]
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    words: Vec<PlacedWord>,
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

impl TextInterpreter {
    fn new(page_height: f32) -> Self {
        Self {
            page_height,
            font_size: 12.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            words: Vec::new(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let number = |index: usize| operands.get(index).and_then(|obj| obj.as_float().ok());

        match operator {
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let Some(size) = number(1) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = number(0) {
                    self.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                let values: Vec<f32> = (0..6).filter_map(number).collect();
                if let Ok(matrix) = <[f32; 6]>::try_from(values) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Ok(adjust) = other.as_float() {
                                    self.advance(-adjust / 1000.0 * self.font_size);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let [a, b, c, d, e, f] = self.line_matrix;
        self.line_matrix = [a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d];
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, distance: f32) {
        self.text_matrix[4] += distance * self.text_matrix[0];
    }

    fn effective_size(&self) -> f32 {
        let scale_y = self.text_matrix[3].abs();
        let scale = if scale_y > 0.0 { scale_y } else { self.text_matrix[0].abs().max(1.0) };
        (self.font_size * scale).abs()
    }

    fn show(&mut self, bytes: &[u8]) {
        let size = self.effective_size();
        let glyph = self.font_size * AVERAGE_ADVANCE_EM;
        let glyph_on_page = glyph * self.text_matrix[0].abs().max(f32::EPSILON);
        let origin_x = self.text_matrix[4];
        let baseline = self.text_matrix[5];
        let top = self.page_height - baseline - size * ASCENT_EM;

        // Latin-1 is the closest cheap approximation of simple-font encodings.
        let chars: Vec<char> = bytes.iter().map(|&b| b as char).collect();

        let mut start: Option<usize> = None;
        for index in 0..=chars.len() {
            let boundary = index == chars.len() || chars[index].is_whitespace();
            match (boundary, start) {
                (false, None) => start = Some(index),
                (true, Some(begin)) => {
                    let text: String = chars[begin..index].iter().collect();
                    let x = origin_x + begin as f32 * glyph_on_page;
                    let width = (index - begin) as f32 * glyph_on_page;
                    self.words.push(PlacedWord {
                        baseline,
                        font_size: size,
                        run: TextRun::new(text, Rect::new(x, top, width, size)),
                    });
                    start = None;
                }
                _ => {}
            }
        }

        self.advance(chars.len() as f32 * glyph);
    }

    fn finish(self) -> StructuredTextPage {
        let mut lines: Vec<(f32, f32, Vec<TextRun>)> = Vec::new();

        for word in self.words {
            match lines.last_mut() {
                Some((baseline, size, runs))
                    if (word.baseline - *baseline).abs() < size.max(word.font_size) * 0.5 =>
                {
                    runs.push(word.run);
                }
                _ => lines.push((word.baseline, word.font_size, vec![word.run])),
            }
        }

        let mut lines: Vec<TextLine> = lines
            .into_iter()
            .map(|(_, _, mut runs)| {
                runs.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
                TextLine::from_runs(runs)
            })
            .collect();
        lines.sort_by(|a, b| a.bbox.y.total_cmp(&b.bbox.y));

        StructuredTextPage::new(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{fixture_pdf, FixturePage};

    fn two_page_backend() -> LopdfBackend {
        let bytes = fixture_pdf(&[
            FixturePage::letter(&[(72, 700, "Hello world"), (72, 680, "Second line")]),
            FixturePage { width: 300, height: 400, lines: &[] },
        ])
        .unwrap();
        LopdfBackend::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn reads_page_count_and_sizes() {
        let backend = two_page_backend();
        assert_eq!(backend.page_count(), 2);
        assert_eq!(backend.page_size(0).unwrap(), PageSize::new(612.0, 792.0));
        assert_eq!(backend.page_size(1).unwrap(), PageSize::new(300.0, 400.0));
        assert_eq!(backend.page_sizes().unwrap().len(), 2);
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let backend = two_page_backend();
        let err = backend.page_size(5).unwrap_err();
        assert!(matches!(err, EngineError::PageOutOfRange { page: 5, page_count: 2 }));
    }

    #[test]
    fn render_scales_dimensions() {
        let backend = two_page_backend();
        let pixels = backend.render_page(1, 0.5, RenderMode::Light).unwrap();
        assert_eq!((pixels.width(), pixels.height()), (150, 200));
        assert_eq!(pixels.pixel(75, 100), Some(RenderMode::Light.paper()));
    }

    #[test]
    fn dark_mode_uses_dark_paper() {
        let backend = two_page_backend();
        let pixels = backend.render_page(1, 0.25, RenderMode::Dark).unwrap();
        assert_eq!(pixels.pixel(30, 50), Some(RenderMode::Dark.paper()));
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let backend = two_page_backend();
        assert!(matches!(
            backend.render_page(0, 0.0, RenderMode::Light),
            Err(EngineError::InvalidScale(_))
        ));
        assert!(backend.render_page(0, f32::NAN, RenderMode::Light).is_err());
    }

    #[test]
    fn extracts_words_in_reading_order() {
        let backend = two_page_backend();
        let text = backend.extract_structured_text(0).unwrap();

        assert_eq!(text.lines.len(), 2);
        let words: Vec<&str> =
            text.lines[0].runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(words, vec!["Hello", "world"]);
        assert_eq!(text.plain_text(), "Hello world\nSecond line");

        let hello = &text.lines[0].runs[0];
        assert!((hello.bbox.x - 72.0).abs() < 1e-3);
        assert!((hello.bbox.y - (792.0 - 700.0 - 12.0 * ASCENT_EM)).abs() < 1e-3);
        assert!(text.lines[0].runs[1].bbox.x > hello.bbox.right());
    }

    #[test]
    fn page_without_text_is_empty() {
        let backend = two_page_backend();
        assert!(backend.extract_structured_text(1).unwrap().is_empty());
    }

    #[test]
    fn text_pages_render_ink() {
        let backend = two_page_backend();
        let pixels = backend.render_page(0, 1.0, RenderMode::Light).unwrap();
        let text = backend.extract_structured_text(0).unwrap();
        let bbox = text.lines[0].runs[0].bbox;
        let x = (bbox.x + bbox.width / 2.0) as u32;
        let y = (bbox.y + bbox.height * 0.5) as u32;
        assert_eq!(pixels.pixel(x, y), Some(RenderMode::Light.ink()));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        assert!(LopdfBackend::from_bytes(b"not a pdf").is_err());
    }

    #[test]
    fn encrypted_documents_are_refused() {
        let mut bytes = fixture_pdf(&[FixturePage { width: 10, height: 10, lines: &[] }]).unwrap();
        bytes.extend_from_slice(b"\n% /Encrypt\n");
        assert!(matches!(
            LopdfBackend::from_bytes(&bytes),
            Err(EngineError::EncryptedUnsupported)
        ));
    }

    #[test]
    fn interpreter_handles_tj_arrays_and_next_line() {
        let mut interpreter = TextInterpreter::new(100.0);
        interpreter.apply("BT", &[]);
        interpreter.apply("Tf", &["F1".into(), 10.into()]);
        interpreter.apply("TL", &[12.into()]);
        interpreter.apply("Td", &[10.into(), 80.into()]);
        interpreter.apply(
            "TJ",
            &[Object::Array(vec![
                Object::string_literal("ab"),
                Object::Integer(-1000),
                Object::string_literal("cd"),
            ])],
        );
        interpreter.apply("T*", &[]);
        interpreter.apply("Tj", &[Object::string_literal("next")]);
        let page = interpreter.finish();

        assert_eq!(page.lines.len(), 2);
        // The -1000 adjustment inserts a full em before "cd".
        let runs = &page.lines[0].runs;
        assert_eq!(runs.len(), 2);
        assert!((runs[1].bbox.x - (10.0 + 2.0 * 5.5 + 10.0)).abs() < 1e-3);
        assert_eq!(page.lines[1].runs[0].text, "next");
    }
}
