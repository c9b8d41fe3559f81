//! Minimal XML document model over `quick-xml`.
//!
//! Response payloads are small, shallow documents, so they are read into a
//! tree of `Element`s and inspected by name. Request bodies are written
//! directly as compact strings with escaped text.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::constants::{CODE, ERROR_TAG, HOST_ID, MESSAGE, REQUEST_ID, XML_DECLARATION, XML_NAMESPACE};
use crate::error::{ErrorInfo, MqError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Text of the first child element called `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .map(|child| child.text.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// Parse `raw` and return its root element.
///
/// Any syntax error, an unclosed element, or a document with no root is a
/// client error carrying the raw payload.
pub(crate) fn parse_document(raw: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(raw);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => stack.push(Element {
                name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Ok(Event::Empty(start)) => {
                let element = Element {
                    name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| malformed(raw, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(|e| malformed(raw, e))?;
                    current.text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(raw, e)),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed(raw, "unclosed element"));
    }
    root.ok_or_else(|| malformed(raw, "no root element"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn malformed(raw: &[u8], reason: impl std::fmt::Display) -> MqError {
    MqError::client(format!(
        "malformed response XML ({reason}): {}",
        String::from_utf8_lossy(raw)
    ))
}

/// Map an error payload to an `MqError`.
///
/// A generic `<Error>` root becomes `MqError::Server` with `status` attached.
/// Anything else is unexpected and becomes a client error with the payload.
pub(crate) fn common_error(root: &Element, status: u16, raw: &[u8]) -> MqError {
    if root.name != ERROR_TAG {
        return MqError::client(format!(
            "unknown error response (HTTP {status}): {}",
            String::from_utf8_lossy(raw)
        ));
    }
    let text = |name: &str| root.child_text(name).unwrap_or_default().to_string();
    MqError::Server(ErrorInfo {
        code: text(CODE),
        message: text(MESSAGE),
        request_id: text(REQUEST_ID),
        host_id: text(HOST_ID),
        http_status: status,
    })
}

/// Compact request document builder.
pub(crate) struct XmlWriter {
    root: &'static str,
    out: String,
}

impl XmlWriter {
    pub fn new(root: &'static str) -> Self {
        let mut out = String::from(XML_DECLARATION);
        out.push('<');
        out.push_str(root);
        out.push_str(r#" xmlns=""#);
        out.push_str(XML_NAMESPACE);
        out.push_str(r#"">"#);
        Self { root, out }
    }

    pub fn element(&mut self, name: &str, text: &str) -> &mut Self {
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
        self.out.push_str(&escape(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
        self
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("</");
        self.out.push_str(self.root);
        self.out.push('>');
        self.out
    }
}
