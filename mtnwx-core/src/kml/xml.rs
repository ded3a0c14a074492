//! Minimal XML element tree.
//!
//! Elements are addressed by local name (namespace prefixes dropped). Text
//! and CDATA directly inside an element are concatenated into `text`, which
//! is trimmed once the element closes.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child called `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = utf8(start.local_name().as_ref())?;
        let mut attributes = BTreeMap::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
            let key = utf8(attr.key.local_name().as_ref())?;
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Syntax(e.to_string()))?;
            attributes.insert(key, value.into_owned());
        }

        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn push_text(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        match &mut self.text {
            Some(text) => text.push_str(chunk),
            None => self.text = Some(chunk.to_string()),
        }
    }

    fn finish(mut self) -> Self {
        self.text = self
            .text
            .take()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        self
    }
}

/// Parse `input` into its root element.
pub fn parse(input: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(input);

    let mut open: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax(e.to_string()))?;

        match event {
            Event::Start(start) => open.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                close(&mut open, &mut root, element)?;
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected closing tag".to_string()))?;
                close(&mut open, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| XmlError::Syntax(e.to_string()))?;
                if let Some(current) = open.last_mut() {
                    current.push_text(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    current.push_text(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(XmlError::Unclosed(unclosed.name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn close(
    open: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    let element = element.finish();
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => return Err(XmlError::MultipleRoots),
        None => *root = Some(element),
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| XmlError::Syntax(e.to_string()))
}
