use pageflow_engine::{Rect, StructuredTextPage, TextLine, TextRun};

/// Where the text of a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSource {
    Structured,
    Ocr,
    /// Neither source produced any words.
    None,
}

/// Text of one page as lines of words, in page units (points, top-left origin),
/// whichever source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: usize,
    pub source: TextSource,
    pub lines: Vec<TextLine>,
}

impl PageText {
    pub fn empty(page: usize) -> Self {
        Self { page, source: TextSource::None, lines: Vec::new() }
    }

    pub fn from_structured(page: usize, text: &StructuredTextPage) -> Self {
        Self { page, source: TextSource::Structured, lines: text.lines.clone() }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.runs.is_empty())
    }

    /// Words in reading order.
    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines
            .iter()
            .flat_map(|line| line.runs.iter())
            .flat_map(|run| run.text.split_whitespace())
    }

    pub fn word_count(&self) -> usize {
        self.words().count()
    }

    /// Index of the run under a page-space point, as `(line, run)`.
    pub fn run_at(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        self.lines.iter().enumerate().find_map(|(line_index, line)| {
            line.runs
                .iter()
                .position(|run| run.bbox.contains(x, y))
                .map(|run_index| (line_index, run_index))
        })
    }

    /// Runs whose boxes intersect a page-space rectangle, grouped by line.
    pub fn runs_in_rect(&self, rect: &Rect) -> Vec<Vec<&TextRun>> {
        self.lines
            .iter()
            .map(|line| {
                line.runs.iter().filter(|run| run.bbox.intersects(rect)).collect::<Vec<_>>()
            })
            .filter(|runs| !runs.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PageText {
        PageText {
            page: 0,
            source: TextSource::Structured,
            lines: vec![
                TextLine::from_runs(vec![
                    TextRun::new("one", Rect::new(10.0, 10.0, 20.0, 10.0)),
                    TextRun::new("two three", Rect::new(40.0, 10.0, 50.0, 10.0)),
                ]),
                TextLine::from_runs(vec![TextRun::new("four", Rect::new(10.0, 30.0, 25.0, 10.0))]),
            ],
        }
    }

    #[test]
    fn words_split_multi_word_runs() {
        let text = sample();
        let words: Vec<&str> = text.words().collect();
        assert_eq!(words, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn run_at_finds_hovered_run() {
        let text = sample();
        assert_eq!(text.run_at(15.0, 15.0), Some((0, 0)));
        assert_eq!(text.run_at(12.0, 35.0), Some((1, 0)));
        assert_eq!(text.run_at(200.0, 200.0), None);
    }

    #[test]
    fn runs_in_rect_groups_by_line() {
        let text = sample();
        let hits = text.runs_in_rect(&Rect::new(0.0, 0.0, 35.0, 50.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0][0].text, "one");
        assert_eq!(hits[1][0].text, "four");
    }

    #[test]
    fn empty_page_text() {
        let text = PageText::empty(3);
        assert!(text.is_empty());
        assert_eq!(text.word_count(), 0);
        assert_eq!(text.source, TextSource::None);
    }
}
