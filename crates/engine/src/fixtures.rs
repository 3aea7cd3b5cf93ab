//! Generated PDFs for tests.
//!
//! Compiled for this crate's unit tests and, behind the `fixtures` feature, for
//! the integration tests of downstream crates.

use crate::backend::EngineResult;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// A page with its media box and `(x, baseline, text)` lines of 12pt Courier.
#[derive(Debug, Clone, Copy)]
pub struct FixturePage<'a> {
    pub width: i64,
    pub height: i64,
    pub lines: &'a [(i64, i64, &'a str)],
}

impl<'a> FixturePage<'a> {
    /// A US Letter page.
    pub fn letter(lines: &'a [(i64, i64, &'a str)]) -> Self {
        Self { width: 612, height: 792, lines }
    }
}

/// Serialise `pages` as an uncompressed PDF with one shared font.
pub fn fixture_pdf(pages: &[FixturePage<'_>]) -> EngineResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let mut operations = Vec::with_capacity(page.lines.len() * 5);
        for &(x, y, text) in page.lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![x.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
