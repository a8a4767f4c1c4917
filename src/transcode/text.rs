//! Positioned text runs: extraction from a page and re-emission on a bare page.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;
use crate::pdf::objects::{
    dict_of, name_of, number, operand_numbers, page_content, page_resources, resolve,
    resource_entry, stream_bytes,
};
use crate::pdf::Matrix;

/// Nesting limit for form XObjects containing other forms
const MAX_FORM_DEPTH: usize = 12;

/// Glyph advance for fonts without usable metrics, in text space units
const FALLBACK_ADVANCE: f32 = 500.0;

/// One text-showing operator with everything needed to place it again
#[derive(Debug, Clone)]
pub struct TextRun {
    /// Start of the run in default user space
    pub origin: (f32, f32),
    /// Font size after the text and graphics matrices are applied
    pub font_size: f32,
    /// Orientation of the run with the size factored out; `e`/`f` equal `origin`
    pub orientation: Matrix,
    /// Font resource in effect, as found in the resource dictionary
    pub font: Option<Object>,
    /// The string (`Tj`) or kerned array (`TJ`) shown, byte for byte
    pub operand: Object,
    pub char_spacing: f32,
    pub word_spacing: f32,
    /// Horizontal scaling in percent
    pub horizontal_scale: f32,
}

impl TextRun {
    /// True when the operand is a `TJ` array
    pub fn is_kerned(&self) -> bool {
        matches!(self.operand, Object::Array(_))
    }

    /// Raw string bytes of the run, kerning dropped
    pub fn text(&self) -> Vec<u8> {
        match &self.operand {
            Object::String(bytes, _) => bytes.clone(),
            Object::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Object::String(bytes, _) => Some(bytes.as_slice()),
                    _ => None,
                })
                .flatten()
                .copied()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Collect every text run on a page, including runs inside form XObjects
pub fn extract_text_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRun>> {
    let content = page_content(doc, page_id)?;
    let mut walker = TextWalker {
        doc,
        runs: Vec::new(),
    };
    walker.walk(
        &content,
        page_resources(doc, page_id),
        Matrix::identity(),
        TextState::default(),
        0,
    );
    Ok(walker.runs)
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<FontRef>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 100.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct FontRef {
    object: Object,
    metrics: FontMetrics,
}

/// Glyph widths in thousandths of text space
#[derive(Debug, Clone)]
enum FontMetrics {
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    /// Type0 fonts, read as two-byte codes
    Composite {
        widths: HashMap<u32, f32>,
        default: f32,
    },
    Unknown,
}

impl FontMetrics {
    fn load(doc: &Document, font: &Dictionary) -> Self {
        if font.get(b"Subtype").ok().and_then(name_of) == Some(b"Type0".as_slice()) {
            return Self::load_composite(doc, font);
        }

        let widths = match font.get(b"Widths").ok().and_then(|w| resolve(doc, w)) {
            Some(Object::Array(widths)) => widths
                .iter()
                .map(|w| resolve(doc, w).and_then(number).unwrap_or(0.0))
                .collect(),
            _ => return FontMetrics::Unknown,
        };
        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|v| resolve(doc, v))
            .and_then(number)
            .unwrap_or(0.0) as u32;
        let missing = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|d| dict_of(doc, d))
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number)
            .unwrap_or(0.0);

        FontMetrics::Simple {
            first_char,
            widths,
            missing,
        }
    }

    fn load_composite(doc: &Document, font: &Dictionary) -> Self {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|d| resolve(doc, d))
            .and_then(|d| d.as_array().ok())
            .and_then(|fonts| fonts.first())
            .and_then(|f| dict_of(doc, f));
        let Some(descendant) = descendant else {
            return FontMetrics::Composite {
                widths: HashMap::new(),
                default: 1000.0,
            };
        };

        let default = descendant
            .get(b"DW")
            .ok()
            .and_then(number)
            .unwrap_or(1000.0);
        let mut widths = HashMap::new();
        if let Some(Object::Array(entries)) = descendant.get(b"W").ok().and_then(|w| resolve(doc, w))
        {
            parse_cid_widths(doc, entries, &mut widths);
        }
        FontMetrics::Composite { widths, default }
    }

    fn bytes_per_code(&self) -> usize {
        match self {
            FontMetrics::Composite { .. } => 2,
            _ => 1,
        }
    }

    fn width(&self, code: u32) -> f32 {
        match self {
            FontMetrics::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            FontMetrics::Composite { widths, default } => {
                widths.get(&code).copied().unwrap_or(*default)
            }
            FontMetrics::Unknown => FALLBACK_ADVANCE,
        }
    }
}

/// Read a CIDFont `/W` array: `c [w1 w2 ...]` and `c_first c_last w` forms
fn parse_cid_widths(doc: &Document, entries: &[Object], widths: &mut HashMap<u32, f32>) {
    let mut i = 0;
    while i < entries.len() {
        let Some(first) = resolve(doc, &entries[i]).and_then(number) else {
            break;
        };
        let first = first as u32;
        match entries.get(i + 1).and_then(|e| resolve(doc, e)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = resolve(doc, w).and_then(number) {
                        widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(first as f32) as u32;
                let w = entries
                    .get(i + 2)
                    .and_then(|w| resolve(doc, w))
                    .and_then(number)
                    .unwrap_or(0.0);
                for code in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
}

struct TextWalker<'a> {
    doc: &'a Document,
    runs: Vec<TextRun>,
}

impl<'a> TextWalker<'a> {
    fn walk(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        state: TextState,
        depth: usize,
    ) {
        let content = match Content::decode(content) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("Skipping undecodable content stream: {}", e);
                return;
            }
        };

        let mut ctm = ctm;
        let mut state = state;
        let mut stack: Vec<(Matrix, TextState)> = Vec::new();
        let mut tm = Matrix::identity();
        let mut tlm = Matrix::identity();

        for op in &content.operations {
            let nums = || operand_numbers(&op.operands);
            match op.operator.as_str() {
                "q" => stack.push((ctm, state.clone())),
                "Q" => {
                    if let Some((saved_ctm, saved_state)) = stack.pop() {
                        ctm = saved_ctm;
                        state = saved_state;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&nums()) {
                        ctm = m.concat(&ctm);
                    }
                }
                "BT" => {
                    tm = Matrix::identity();
                    tlm = Matrix::identity();
                }
                "Tf" => {
                    if let Some(name) = op.operands.first().and_then(name_of) {
                        state.font = self.font(resources, name);
                    }
                    if let Some(size) = op.operands.get(1).and_then(number) {
                        state.size = size;
                    }
                }
                "Tc" => set_first(&mut state.char_spacing, &nums()),
                "Tw" => set_first(&mut state.word_spacing, &nums()),
                "Tz" => set_first(&mut state.horizontal_scale, &nums()),
                "TL" => set_first(&mut state.leading, &nums()),
                "Ts" => set_first(&mut state.rise, &nums()),
                "Td" | "TD" => {
                    if let [tx, ty] = nums()[..] {
                        if op.operator == "TD" {
                            state.leading = -ty;
                        }
                        tlm = Matrix::translate(tx, ty).concat(&tlm);
                        tm = tlm;
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(&nums()) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -state.leading).concat(&tlm);
                    tm = tlm;
                }
                "Tj" | "TJ" => {
                    if let Some(operand) = op.operands.first() {
                        self.show(operand, &state, &mut tm, &ctm);
                    }
                }
                "'" => {
                    tlm = Matrix::translate(0.0, -state.leading).concat(&tlm);
                    tm = tlm;
                    if let Some(operand) = op.operands.first() {
                        self.show(operand, &state, &mut tm, &ctm);
                    }
                }
                "\"" => {
                    if let [aw, ac, ..] = nums()[..] {
                        state.word_spacing = aw;
                        state.char_spacing = ac;
                    }
                    tlm = Matrix::translate(0.0, -state.leading).concat(&tlm);
                    tm = tlm;
                    if let Some(operand) = op.operands.get(2) {
                        self.show(operand, &state, &mut tm, &ctm);
                    }
                }
                "Do" if depth < MAX_FORM_DEPTH => {
                    if let Some(name) = op.operands.first().and_then(name_of) {
                        self.walk_form(name, resources, ctm, &state, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_form(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        state: &TextState,
        depth: usize,
    ) {
        let doc = self.doc;
        let stream = match resource_entry(doc, resources, b"XObject", name).and_then(|o| resolve(doc, o)) {
            Some(Object::Stream(stream)) => stream,
            _ => return,
        };
        if stream.dict.get(b"Subtype").ok().and_then(name_of) != Some(b"Form".as_slice()) {
            return;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| resolve(doc, m))
            .and_then(|m| m.as_array().ok())
            .and_then(|values| Matrix::from_operands(&operand_numbers(values)))
            .unwrap_or_default();
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| dict_of(doc, r))
            .or(resources);

        match stream_bytes(stream) {
            Ok(bytes) => self.walk(
                &bytes,
                form_resources,
                matrix.concat(&ctm),
                state.clone(),
                depth + 1,
            ),
            Err(e) => log::debug!("Skipping form XObject: {}", e),
        }
    }

    fn font(&self, resources: Option<&'a Dictionary>, name: &[u8]) -> Option<FontRef> {
        let object = resource_entry(self.doc, resources, b"Font", name)?;
        let metrics = dict_of(self.doc, object)
            .map(|font| FontMetrics::load(self.doc, font))
            .unwrap_or(FontMetrics::Unknown);
        Some(FontRef {
            object: object.clone(),
            metrics,
        })
    }

    /// Record a run at the current text matrix, then advance past it
    fn show(&mut self, operand: &Object, state: &TextState, tm: &mut Matrix, ctm: &Matrix) {
        let operand = match resolve(self.doc, operand) {
            Some(obj @ (Object::String(..) | Object::Array(_))) => obj.clone(),
            _ => return,
        };

        let trm = tm.concat(ctm);
        let origin = trm.apply(0.0, state.rise);
        let scale = trm.scale_y();
        let font_size = state.size * scale;
        let orientation = if scale > 0.0 {
            Matrix::new(trm.a / scale, trm.b / scale, trm.c / scale, trm.d / scale, origin.0, origin.1)
        } else {
            Matrix::translate(origin.0, origin.1)
        };

        let advance = self.advance(&operand, state);
        *tm = Matrix::translate(advance, 0.0).concat(tm);

        self.runs.push(TextRun {
            origin,
            font_size,
            orientation,
            font: state.font.as_ref().map(|f| f.object.clone()),
            operand,
            char_spacing: state.char_spacing,
            word_spacing: state.word_spacing,
            horizontal_scale: state.horizontal_scale,
        });
    }

    /// Horizontal displacement of a shown operand in text space
    fn advance(&self, operand: &Object, state: &TextState) -> f32 {
        let scale = state.horizontal_scale / 100.0;
        let unknown = FontMetrics::Unknown;
        let metrics = state.font.as_ref().map_or(&unknown, |f| &f.metrics);

        let string_advance = |bytes: &[u8]| -> f32 {
            let step = metrics.bytes_per_code();
            bytes
                .chunks(step)
                .map(|chunk| {
                    let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                    let word = if step == 1 && code == 32 {
                        state.word_spacing
                    } else {
                        0.0
                    };
                    (metrics.width(code) / 1000.0 * state.size + state.char_spacing + word) * scale
                })
                .sum()
        };

        match operand {
            Object::String(bytes, _) => string_advance(bytes),
            Object::Array(items) => items
                .iter()
                .map(|item| match item {
                    Object::String(bytes, _) => string_advance(bytes),
                    other => number(other)
                        .map(|adjust| -adjust / 1000.0 * state.size * scale)
                        .unwrap_or(0.0),
                })
                .sum(),
            _ => 0.0,
        }
    }
}

fn set_first(target: &mut f32, values: &[f32]) {
    if let Some(value) = values.first() {
        *target = *value;
    }
}

/// Replace a page with a bare page carrying only its text runs in black.
///
/// The new page keeps the source page's box and rotation. Its only resources
/// are the fonts the runs use, renamed `/F0`, `/F1`, ...
pub fn build_text_page(
    doc: &mut Document,
    page_id: ObjectId,
    parent: Option<ObjectId>,
    media_box: [f32; 4],
    rotation: i64,
    runs: &[TextRun],
) -> Result<()> {
    let mut fonts = Dictionary::new();
    let mut by_id: HashMap<ObjectId, Vec<u8>> = HashMap::new();
    let mut fallback: Option<Vec<u8>> = None;
    let mut operations = Vec::with_capacity(runs.len() * 8);

    for run in runs {
        let font_name = match &run.font {
            Some(Object::Reference(id)) => by_id
                .entry(*id)
                .or_insert_with(|| {
                    let name = format!("F{}", fonts.len()).into_bytes();
                    fonts.set(name.clone(), Object::Reference(*id));
                    name
                })
                .clone(),
            Some(Object::Dictionary(dict)) => {
                let name = format!("F{}", fonts.len()).into_bytes();
                let id = doc.add_object(dict.clone());
                fonts.set(name.clone(), Object::Reference(id));
                name
            }
            _ => fallback
                .get_or_insert_with(|| {
                    let name = format!("F{}", fonts.len()).into_bytes();
                    let id = doc.add_object(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    });
                    fonts.set(name.clone(), Object::Reference(id));
                    name
                })
                .clone(),
        };

        let m = &run.orientation;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(font_name), Object::Real(run.font_size)],
        ));
        operations.push(Operation::new("g", vec![0.into()]));
        operations.push(Operation::new("Tr", vec![0.into()]));
        if run.char_spacing != 0.0 {
            operations.push(Operation::new("Tc", vec![Object::Real(run.char_spacing)]));
        }
        if run.word_spacing != 0.0 {
            operations.push(Operation::new("Tw", vec![Object::Real(run.word_spacing)]));
        }
        if run.horizontal_scale != 100.0 {
            operations.push(Operation::new("Tz", vec![Object::Real(run.horizontal_scale)]));
        }
        operations.push(Operation::new(
            "Tm",
            [m.a, m.b, m.c, m.d, m.e, m.f]
                .into_iter()
                .map(Object::Real)
                .collect(),
        ));
        let show = if run.is_kerned() { "TJ" } else { "Tj" };
        operations.push(Operation::new(show, vec![run.operand.clone()]));
        operations.push(Operation::new("ET", vec![]));
    }

    let content = Content { operations }.encode()?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let mut page = dictionary! {
        "Type" => "Page",
        "MediaBox" => media_box.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
        "Resources" => dictionary! { "Font" => fonts },
        "Contents" => content_id,
    };
    if let Some(parent) = parent {
        page.set("Parent", parent);
    }
    if rotation != 0 {
        page.set("Rotate", rotation);
    }
    doc.objects.insert(page_id, Object::Dictionary(page));
    Ok(())
}
