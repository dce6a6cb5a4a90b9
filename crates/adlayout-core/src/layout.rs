//! Layout records and the JSON proposal schema
//!
//! Proposals are untrusted: any key may be missing or have the wrong type.
//! [`LayoutDocument::from_value`] never fails. Entries it cannot read are kept
//! without a box (or dropped, when they are not objects at all) and reported
//! as [`MalformedInput`](crate::diagnostics::MalformedInput).

use serde_json::{json, Map, Value};

use crate::diagnostics::{Diagnostics, ElementArray};
use crate::error::ElementParseError;
use crate::geometry::{round_to, BBox};
use crate::kind::LayoutElementKind;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const DEFAULT_SUBJECT_CENTER: [f64; 2] = [0.5, 0.5];
const DEFAULT_SUBJECT_RATIO: [f64; 2] = [0.3, 0.3];

/// One overlay element (or subject marker) from a proposal
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutElement {
    pub kind: LayoutElementKind,
    /// Tag exactly as the proposer wrote it
    pub raw_type: String,
    pub bbox: Option<BBox>,
    pub confidence: f64,
    pub content: String,
    /// `"<type>#<index>"` link from an underlay to the text it backs
    pub for_ref: Option<String>,
    pub style: Option<Value>,
}

impl LayoutElement {
    #[must_use]
    pub fn new(kind: LayoutElementKind, bbox: BBox, confidence: f64) -> Self {
        Self {
            raw_type: kind.as_str().to_string(),
            kind,
            bbox: Some(bbox),
            confidence,
            content: String::new(),
            for_ref: None,
            style: None,
        }
    }

    /// Serialize back to the proposal schema
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.kind.as_str().to_string()));
        if let Some(b) = &self.bbox {
            obj.insert("bbox".into(), json!(b.to_array()));
        }
        obj.insert("confidence".into(), json!(self.confidence));
        if !self.content.is_empty() {
            obj.insert("content".into(), Value::String(self.content.clone()));
        }
        if let Some(r) = &self.for_ref {
            obj.insert("for".into(), Value::String(r.clone()));
        }
        if let Some(style) = &self.style {
            obj.insert("style".into(), style.clone());
        }
        Value::Object(obj)
    }
}

/// The resolved geometry of one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub subject: Option<BBox>,
    pub texts: Vec<LayoutElement>,
    pub graphics: Vec<LayoutElement>,
}

impl Layout {
    /// First element of `kind` that carries a box
    #[must_use]
    pub fn first_of(&self, kind: &LayoutElementKind) -> Option<&LayoutElement> {
        self.texts
            .iter()
            .chain(self.graphics.iter())
            .find(|e| &e.kind == kind && e.bbox.is_some())
    }

    #[must_use]
    pub fn headline_bbox(&self) -> Option<BBox> {
        self.first_of(&LayoutElementKind::Headline).and_then(|e| e.bbox)
    }

    #[must_use]
    pub fn logo_bbox(&self) -> Option<BBox> {
        self.first_of(&LayoutElementKind::Logo).and_then(|e| e.bbox)
    }

    /// The `layout` object of the output schema
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if let Some(s) = &self.subject {
            let (cx, cy) = s.center();
            obj.insert(
                "subject_layout".into(),
                json!({
                    "center": [round_to(cx, 3), round_to(cy, 3)],
                    "ratio": [round_to(s.w(), 3), round_to(s.h(), 3)],
                }),
            );
        }
        obj.insert(
            "nongraphic_layout".into(),
            Value::Array(self.texts.iter().map(LayoutElement::to_value).collect()),
        );
        obj.insert(
            "graphic_layout".into(),
            Value::Array(self.graphics.iter().map(LayoutElement::to_value).collect()),
        );
        Value::Object(obj)
    }
}

/// A parsed proposal plus what is needed to write it back
#[derive(Debug, Clone, Default)]
pub struct LayoutDocument {
    /// Top-level keys other than `layout`, passed through untouched
    pub passthrough: Map<String, Value>,
    pub has_layout: bool,
    pub layout: Layout,
    /// Length of `background.prompt` after trimming
    pub prompt_len: usize,
}

impl LayoutDocument {
    /// Read a proposal document, recording every problem in `diag`
    pub fn from_value(doc: &Value, diag: &mut Diagnostics) -> Self {
        let Some(root) = doc.as_object() else {
            return Self::default();
        };
        let mut passthrough = root.clone();
        let layout_value = passthrough.remove("layout");
        let has_layout = layout_value.is_some();
        let prompt_len = root
            .get("background")
            .and_then(|bg| bg.get("prompt"))
            .and_then(Value::as_str)
            .map_or(0, |p| p.trim().chars().count());

        let layout = layout_value
            .as_ref()
            .and_then(Value::as_object)
            .map(|obj| parse_layout(obj, diag))
            .unwrap_or_default();

        Self {
            passthrough,
            has_layout,
            layout,
            prompt_len,
        }
    }

    /// Output document: every passthrough key plus the resolved `layout`
    #[must_use]
    pub fn to_value(&self, layout: &Layout) -> Value {
        let mut root = self.passthrough.clone();
        root.insert("layout".into(), layout.to_value());
        Value::Object(root)
    }
}

fn parse_layout(obj: &Map<String, Value>, diag: &mut Diagnostics) -> Layout {
    let texts = parse_elements(obj.get("nongraphic_layout"), ElementArray::Texts, diag);
    let graphics = parse_elements(obj.get("graphic_layout"), ElementArray::Graphics, diag);

    let mut subject = match obj.get("subject_layout") {
        None | Some(Value::Null) => None,
        Some(v) => match parse_subject_layout(v) {
            Ok(b) => Some(b),
            Err(e) => {
                diag.record_malformed(ElementArray::Subject, 0, e);
                None
            }
        },
    };
    diag.proposed_headlines = count_boxed(&texts, &LayoutElementKind::Headline);
    diag.proposed_logos = count_boxed(&graphics, &LayoutElementKind::Logo);
    if subject.is_none() {
        subject = texts
            .iter()
            .chain(graphics.iter())
            .find(|e| e.kind == LayoutElementKind::Subject)
            .and_then(|e| e.bbox);
    }

    Layout {
        subject,
        texts,
        graphics,
    }
}

fn count_boxed(elements: &[LayoutElement], kind: &LayoutElementKind) -> usize {
    elements
        .iter()
        .filter(|e| &e.kind == kind && e.bbox.is_some())
        .count()
}

fn parse_elements(v: Option<&Value>, array: ElementArray, diag: &mut Diagnostics) -> Vec<LayoutElement> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match parse_element(item) {
            Ok((element, bbox_error)) => {
                if let Some(e) = bbox_error {
                    diag.record_malformed(array, index, e);
                }
                out.push(element);
            }
            Err(e) => diag.record_malformed(array, index, e),
        }
    }
    out
}

/// Read one array entry.
///
/// Only a non-object entry is an `Err`; a bad box leaves the element boxless
/// and comes back as the second tuple field.
pub fn parse_element(
    v: &Value,
) -> std::result::Result<(LayoutElement, Option<ElementParseError>), ElementParseError> {
    let obj = v.as_object().ok_or(ElementParseError::NotAnObject)?;
    let raw_type = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let kind = LayoutElementKind::resolve(&raw_type);

    let (bbox, bbox_error) = match obj.get("bbox") {
        None | Some(Value::Null) => (None, Some(ElementParseError::MissingBbox)),
        Some(b) => match parse_bbox(b) {
            Ok(b) => (Some(b), None),
            Err(e) => (None, Some(e)),
        },
    };
    let confidence = obj
        .get("confidence")
        .and_then(as_number)
        .filter(|c| c.is_finite())
        .map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0));
    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let for_ref = obj.get("for").and_then(Value::as_str).map(str::to_string);
    let style = obj.get("style").cloned();

    Ok((
        LayoutElement {
            kind,
            raw_type,
            bbox,
            confidence,
            content,
            for_ref,
            style,
        },
        bbox_error,
    ))
}

/// `[x, y, w, h]` with finite numeric entries, clipped into the unit square
pub fn parse_bbox(v: &Value) -> std::result::Result<BBox, ElementParseError> {
    let arr = v.as_array().ok_or(ElementParseError::NotAnArray)?;
    let [x, y, w, h] = finite_quad(arr)?;
    Ok(BBox::new(x, y, w, h))
}

fn finite_quad(arr: &[Value]) -> std::result::Result<[f64; 4], ElementParseError> {
    if arr.len() != 4 {
        return Err(ElementParseError::WrongArity(arr.len()));
    }
    let mut out = [0.0; 4];
    for (index, (slot, item)) in out.iter_mut().zip(arr).enumerate() {
        *slot = as_number(item)
            .filter(|n| n.is_finite())
            .ok_or(ElementParseError::NonNumeric { index })?;
    }
    Ok(out)
}

fn parse_pair(v: Option<&Value>, default: [f64; 2]) -> std::result::Result<[f64; 2], ElementParseError> {
    let Some(v) = v else {
        return Ok(default);
    };
    let arr = v.as_array().ok_or(ElementParseError::NotAnArray)?;
    if arr.len() != 2 {
        return Err(ElementParseError::WrongArity(arr.len()));
    }
    let a = as_number(&arr[0])
        .filter(|n| n.is_finite())
        .ok_or(ElementParseError::NonNumeric { index: 0 })?;
    let b = as_number(&arr[1])
        .filter(|n| n.is_finite())
        .ok_or(ElementParseError::NonNumeric { index: 1 })?;
    Ok([a, b])
}

/// `{center: [cx, cy], ratio: [rw, rh]}`; missing halves use a centered 0.3 box
pub fn parse_subject_layout(v: &Value) -> std::result::Result<BBox, ElementParseError> {
    let obj = v.as_object().ok_or(ElementParseError::NotAnObject)?;
    let [cx, cy] = parse_pair(obj.get("center"), DEFAULT_SUBJECT_CENTER)?;
    let [rw, rh] = parse_pair(obj.get("ratio"), DEFAULT_SUBJECT_RATIO)?;
    Ok(BBox::from_center(cx, cy, rw, rh))
}

/// Numbers, or strings holding a number
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: Value) -> (LayoutDocument, Diagnostics) {
        let mut diag = Diagnostics::new();
        let parsed = LayoutDocument::from_value(&doc, &mut diag);
        (parsed, diag)
    }

    #[test]
    fn test_missing_layout_is_empty() {
        let (doc, diag) = parse(json!({"product": "ring"}));
        assert!(!doc.has_layout);
        assert!(doc.layout.texts.is_empty());
        assert!(diag.malformed.is_empty());
    }

    #[test]
    fn test_missing_arrays_tolerated() {
        let (doc, _) = parse(json!({"layout": {}}));
        assert!(doc.has_layout);
        assert!(doc.layout.texts.is_empty() && doc.layout.graphics.is_empty());
        assert!(doc.layout.subject.is_none());
    }

    #[test]
    fn test_elements_and_defaults() {
        let (doc, diag) = parse(json!({"layout": {
            "nongraphic_layout": [{"type": "Title", "bbox": [0.1, 0.7, 0.6, 0.12], "content": "Sale"}],
            "graphic_layout": [{"type": "brand", "bbox": ["0.8", 0.05, 0.12, 0.06], "confidence": 0.9}]
        }}));
        assert!(diag.malformed.is_empty());
        let head = &doc.layout.texts[0];
        assert_eq!(head.kind, LayoutElementKind::Headline);
        assert_eq!(head.raw_type, "Title");
        assert_eq!(head.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(head.content, "Sale");
        let logo = &doc.layout.graphics[0];
        assert_eq!(logo.kind, LayoutElementKind::Logo);
        assert_eq!(logo.bbox.unwrap().x(), 0.8);
    }

    #[test]
    fn test_malformed_entries_recorded() {
        let (doc, diag) = parse(json!({"layout": {
            "nongraphic_layout": [
                {"type": "headline", "bbox": [0.1, 0.2, 0.3]},
                {"type": "headline", "bbox": [0.1, "x", 0.3, 0.1]},
                {"type": "headline"},
                "not an object"
            ]
        }}));
        assert_eq!(doc.layout.texts.len(), 3);
        assert!(doc.layout.texts.iter().all(|e| e.bbox.is_none()));
        let errors: Vec<_> = diag.malformed.iter().map(|m| m.error.clone()).collect();
        assert_eq!(
            errors,
            vec![
                ElementParseError::WrongArity(3),
                ElementParseError::NonNumeric { index: 1 },
                ElementParseError::MissingBbox,
                ElementParseError::NotAnObject,
            ]
        );
    }

    #[test]
    fn test_subject_layout_precedence() {
        let (doc, _) = parse(json!({"layout": {
            "subject_layout": {"center": [0.5, 0.5], "ratio": [0.4, 0.4]},
            "graphic_layout": [{"type": "product", "bbox": [0.0, 0.0, 0.1, 0.1]}]
        }}));
        let s = doc.layout.subject.unwrap();
        assert!((s.x() - 0.3).abs() < 1e-9 && (s.w() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_subject_from_typed_element() {
        let (doc, _) = parse(json!({"layout": {
            "graphic_layout": [{"type": "Product", "bbox": [0.2, 0.2, 0.5, 0.5]}]
        }}));
        assert_eq!(doc.layout.subject, Some(BBox::new(0.2, 0.2, 0.5, 0.5)));
    }

    #[test]
    fn test_output_keeps_other_keys() {
        let (doc, _) = parse(json!({
            "product": {"name": "ring"},
            "background": {"prompt": "  a soft studio scene  "},
            "layout": {"nongraphic_layout": []}
        }));
        assert_eq!(doc.prompt_len, "a soft studio scene".len());
        let mut layout = Layout {
            subject: Some(BBox::new(0.3, 0.3, 0.4, 0.4)),
            ..Layout::default()
        };
        layout.texts.push(LayoutElement::new(
            LayoutElementKind::Headline,
            BBox::new(0.1, 0.8, 0.5, 0.1),
            0.6,
        ));
        let out = doc.to_value(&layout);
        assert_eq!(out["product"]["name"], "ring");
        assert_eq!(out["layout"]["subject_layout"]["center"], json!([0.5, 0.5]));
        assert_eq!(out["layout"]["nongraphic_layout"][0]["type"], "headline");
        assert!(out["layout"]["graphic_layout"].as_array().unwrap().is_empty());
    }
}
