//! Position-aware page text for `lopdf` documents.
//!
//! Walks the page content stream, tracks the text and transformation matrices, and records
//! every shown string with its device-space position. Fragments are grouped into lines by
//! baseline and laid out left to right with spacing that follows their x positions, so text
//! drawn in separate columns stays separated by wide gaps.

use lopdf::{Encoding, Object, ObjectId, content::Operation};
use std::collections::BTreeMap;

// Average glyph advance as a fraction of the font size; real metrics are not consulted.
const GLYPH_WIDTH_EM: f32 = 0.5;
// Horizontal gap, in glyph widths, that separates two cells on the same line.
const CELL_GAP_GLYPHS: f32 = 2.0;
// Smaller gaps than this (in glyph widths) join fragments without a space.
const WORD_GAP_GLYPHS: f32 = 0.15;
const MIN_CELL_SPACES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `other`.
    fn then(self, other: Self) -> Self {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Self([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn vertical_scale(self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

/// A string drawn on the page with its device-space extent.
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    x0: f32,
    x1: f32,
    y: f32,
    size: f32,
    text: String,
}

struct TextState<'a> {
    ctm: Matrix,
    stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    encoding: Option<&'a Encoding<'a>>,
}

impl<'a> TextState<'a> {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            encoding: None,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translation(tx, ty).then(self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f32) {
        self.tm = Matrix::translation(tx, 0.0).then(self.tm);
    }

    fn show(&mut self, bytes: &[u8], fragments: &mut Vec<Fragment>) {
        let text = decode(self.encoding, bytes);
        let glyphs = text.chars().count() as f32;
        let spaces = text.chars().filter(|ch| *ch == ' ').count() as f32;
        let width = (glyphs * (GLYPH_WIDTH_EM * self.font_size + self.char_spacing)
            + spaces * self.word_spacing)
            * self.horizontal_scale;

        let device = self.tm.then(self.ctm);
        let (x0, y) = device.apply(0.0, 0.0);
        let (x1, _) = device.apply(width, 0.0);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            fragments.push(Fragment {
                x0: x0.min(x1),
                x1: x0.max(x1),
                y,
                size: (self.font_size * device.vertical_scale()).max(1.0),
                text: trimmed.to_string(),
            });
        }
        self.advance(width);
    }
}

fn decode(encoding: Option<&Encoding<'_>>, bytes: &[u8]) -> String {
    encoding
        .and_then(|encoding| lopdf::Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| bytes.iter().map(|&byte| char::from(byte)).collect())
}

fn number(operation: &Operation, index: usize) -> Option<f32> {
    operation
        .operands
        .get(index)
        .and_then(|operand| operand.as_float().ok())
}

fn matrix(operation: &Operation) -> Option<Matrix> {
    let mut values = [0.0; 6];
    for (index, value) in values.iter_mut().enumerate() {
        *value = number(operation, index)?;
    }
    Some(Matrix(values))
}

fn collect_fragments(
    operations: &[Operation],
    encodings: &BTreeMap<Vec<u8>, Encoding<'_>>,
) -> Vec<Fragment> {
    let mut state = TextState::new();
    let mut fragments = Vec::new();

    for operation in operations {
        match operation.operator.as_str() {
            "q" => state.stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operation) {
                    state.ctm = m.then(state.ctm);
                }
            }
            "BT" => {
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                state.encoding = operation
                    .operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name));
                state.font_size = number(operation, 1).unwrap_or(state.font_size);
            }
            "Tc" => state.char_spacing = number(operation, 0).unwrap_or(0.0),
            "Tw" => state.word_spacing = number(operation, 0).unwrap_or(0.0),
            "Tz" => state.horizontal_scale = number(operation, 0).unwrap_or(100.0) / 100.0,
            "TL" => state.leading = number(operation, 0).unwrap_or(0.0),
            "Td" | "TD" => {
                let tx = number(operation, 0).unwrap_or(0.0);
                let ty = number(operation, 1).unwrap_or(0.0);
                if operation.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(m) = matrix(operation) {
                    state.tm = m;
                    state.tlm = m;
                }
            }
            "T*" => state.move_line(0.0, -state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operation.operands.first() {
                    state.show(bytes, &mut fragments);
                }
            }
            "'" | "\"" => {
                if operation.operator == "\"" {
                    state.word_spacing = number(operation, 0).unwrap_or(state.word_spacing);
                    state.char_spacing = number(operation, 1).unwrap_or(state.char_spacing);
                }
                state.move_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = operation.operands.last() {
                    state.show(bytes, &mut fragments);
                }
            }
            "TJ" => {
                let Some(Object::Array(items)) = operation.operands.first() else {
                    continue;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => state.show(bytes, &mut fragments),
                        other => {
                            if let Ok(adjust) = other.as_float() {
                                let tx = -adjust / 1000.0 * state.font_size * state.horizontal_scale;
                                state.advance(tx);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fragments
}

/// Group fragments into lines, top of the page first, each sorted left to right.
fn group_lines(mut fragments: Vec<Fragment>) -> Vec<Vec<Fragment>> {
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x0.total_cmp(&b.x0)));

    let mut lines: Vec<Vec<Fragment>> = Vec::new();
    for fragment in fragments {
        let same_line = lines.last().and_then(|line| line.first()).is_some_and(|first| {
            (first.y - fragment.y).abs() <= first.size.min(fragment.size) * 0.5
        });
        match lines.last_mut() {
            Some(line) if same_line => line.push(fragment),
            _ => lines.push(vec![fragment]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    }
    lines
}

/// Render lines as text. Cells start at a character column proportional to their x position
/// and are separated by at least two spaces; words within a cell by at most one.
fn render(lines: &[Vec<Fragment>]) -> String {
    let column_width = lines
        .iter()
        .flatten()
        .map(|fragment| fragment.size * GLYPH_WIDTH_EM)
        .fold(f32::INFINITY, f32::min);
    if !column_width.is_finite() {
        return String::new();
    }

    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let mut text = String::new();
        let mut width = 0usize;
        let mut previous: Option<&Fragment> = None;
        for fragment in line {
            let glyph = fragment.size * GLYPH_WIDTH_EM;
            match previous {
                Some(prev) if fragment.x0 - prev.x1 < CELL_GAP_GLYPHS * glyph => {
                    if fragment.x0 - prev.x1 > WORD_GAP_GLYPHS * glyph {
                        text.push(' ');
                        width += 1;
                    }
                }
                _ => {
                    let column = (fragment.x0.max(0.0) / column_width).round() as usize;
                    let floor = if previous.is_some() { width + MIN_CELL_SPACES } else { 0 };
                    let target = column.max(floor);
                    text.extend(std::iter::repeat_n(' ', target - width));
                    width = target;
                }
            }
            text.push_str(&fragment.text);
            width += fragment.text.chars().count();
            previous = Some(fragment);
        }
        out.push(text);
    }
    out.join("\n")
}

/// Lay out the text of one page, preserving column gaps as runs of spaces.
pub(crate) fn page_text(pdf: &lopdf::Document, page_id: ObjectId) -> lopdf::Result<String> {
    let fonts = pdf.get_page_fonts(page_id)?;
    let encodings: BTreeMap<Vec<u8>, Encoding<'_>> = fonts
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(pdf) {
            Ok(encoding) => Some((name, encoding)),
            Err(error) => {
                tracing::debug!(error = %error, "Skipping font without a usable encoding");
                None
            }
        })
        .collect();
    let content = pdf.get_and_decode_page_content(page_id)?;
    let fragments = collect_fragments(&content.operations, &encodings);
    Ok(render(&group_lines(fragments)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(x0: f32, y: f32, text: &str) -> Fragment {
        Fragment {
            x0,
            x1: x0 + text.chars().count() as f32 * 5.0,
            y,
            size: 10.0,
            text: text.into(),
        }
    }

    fn text_at(x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    #[test]
    fn positioned_cells_become_separate_columns() {
        let operations: Vec<Operation> = [
            text_at(50, 700, "Revenue"),
            text_at(300, 700, "Expenses"),
            text_at(50, 680, "100"),
            text_at(300, 680, "40"),
        ]
        .concat();

        let text = render(&group_lines(collect_fragments(&operations, &BTreeMap::new())));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].trim_start().starts_with("Revenue"));
        assert!(lines[0].contains("Revenue   "));
        assert!(lines[0].ends_with("Expenses"));
        assert!(lines[1].ends_with("40"));
        assert_eq!(lines[0].find("Expenses"), lines[1].find("40"));
    }

    #[test]
    fn text_matrix_and_line_moves_are_tracked() {
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("TL", vec![12.into()]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 720.into()],
            ),
            Operation::new("Tj", vec![Object::string_literal("Heading")]),
            Operation::new("T*", vec![]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Rev"),
                    Object::Integer(-20),
                    Object::string_literal("enue"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];

        let fragments = collect_fragments(&operations, &BTreeMap::new());
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].y, 720.0);
        assert_eq!(fragments[1].y, 708.0);
        assert_eq!(fragments[1].x0, 72.0);
        let text = render(&group_lines(fragments));
        assert_eq!(text.lines().nth(1).map(str::trim), Some("Revenue"));
    }

    #[test]
    fn nearby_fragments_share_a_cell() {
        let lines = group_lines(vec![
            fragment(10.0, 100.0, "Total"),
            fragment(38.0, 100.5, "expenses"),
            fragment(200.0, 100.0, "40"),
        ]);
        assert_eq!(lines.len(), 1);
        let text = render(&lines);
        assert!(text.contains("Total expenses"));
        assert!(text.contains("expenses  "));
    }

    #[test]
    fn empty_page_renders_nothing() {
        assert_eq!(render(&group_lines(Vec::new())), "");
    }
}
