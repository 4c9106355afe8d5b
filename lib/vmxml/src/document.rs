// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A streaming XML writer with an open-element stack.
//!
//! Attributes may be added to the most recently opened element until it
//! receives content (text or a child). Elements closed without content are
//! written in their empty form, e.g. `<acpi/>`.

use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("XML write failed: {0}")]
    Write(String),

    #[error("attribute {0:?} written after element content")]
    MisplacedAttribute(String),

    #[error("no open element to close")]
    NoOpenElement,

    #[error("document finished with open elements: {0:?}")]
    Unclosed(Vec<String>),

    #[error("document is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub struct DocumentWriter {
    writer: Writer<Vec<u8>>,
    open: Vec<String>,
    pending: Option<BytesStart<'static>>,
}

impl Default for DocumentWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            open: Vec::new(),
            pending: None,
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), DocumentError> {
        self.writer
            .write_event(event)
            .map_err(|e| DocumentError::Write(e.to_string()))
    }

    fn flush_pending(&mut self) -> Result<(), DocumentError> {
        if let Some(start) = self.pending.take() {
            self.emit(Event::Start(start))?;
        }
        Ok(())
    }

    /// Writes the `<?xml version="1.0" encoding="UTF-8"?>` declaration.
    pub fn start_document(&mut self) -> Result<(), DocumentError> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start_element(&mut self, name: &str) -> Result<(), DocumentError> {
        self.flush_pending()?;
        self.pending = Some(BytesStart::new(name.to_owned()));
        self.open.push(name.to_owned());
        Ok(())
    }

    /// Opens `prefix:name`. The prefix must be declared on an ancestor.
    pub fn start_ns_element(
        &mut self,
        prefix: &str,
        name: &str,
    ) -> Result<(), DocumentError> {
        self.start_element(&format!("{prefix}:{name}"))
    }

    pub fn attribute(
        &mut self,
        key: &str,
        value: impl Display,
    ) -> Result<(), DocumentError> {
        let Some(start) = self.pending.as_mut() else {
            return Err(DocumentError::MisplacedAttribute(key.to_owned()));
        };
        let value = value.to_string();
        start.push_attribute((key, value.as_str()));
        Ok(())
    }

    /// Declares `xmlns:prefix` on the open element.
    pub fn namespace(
        &mut self,
        prefix: &str,
        uri: &str,
    ) -> Result<(), DocumentError> {
        self.attribute(&format!("xmlns:{prefix}"), uri)
    }

    pub fn text(&mut self, text: impl Display) -> Result<(), DocumentError> {
        self.flush_pending()?;
        let text = text.to_string();
        self.emit(Event::Text(BytesText::new(&text)))
    }

    pub fn end_element(&mut self) -> Result<(), DocumentError> {
        let name = self.open.pop().ok_or(DocumentError::NoOpenElement)?;
        match self.pending.take() {
            Some(start) => self.emit(Event::Empty(start)),
            None => self.emit(Event::End(BytesEnd::new(name))),
        }
    }

    /// Writes `<name>text</name>`.
    pub fn element(
        &mut self,
        name: &str,
        text: impl Display,
    ) -> Result<(), DocumentError> {
        self.start_element(name)?;
        self.text(text)?;
        self.end_element()
    }

    /// Writes `<prefix:name>text</prefix:name>`.
    pub fn ns_element(
        &mut self,
        prefix: &str,
        name: &str,
        text: impl Display,
    ) -> Result<(), DocumentError> {
        self.start_ns_element(prefix, name)?;
        self.text(text)?;
        self.end_element()
    }

    /// Writes `<name/>`.
    pub fn empty_element(&mut self, name: &str) -> Result<(), DocumentError> {
        self.start_element(name)?;
        self.end_element()
    }

    /// Writes `<name k="v" .../>` with the given attributes.
    pub fn element_with_attrs<'k, V: Display + 'k>(
        &mut self,
        name: &str,
        attrs: impl IntoIterator<Item = (&'k str, V)>,
    ) -> Result<(), DocumentError> {
        self.start_element(name)?;
        for (key, value) in attrs {
            self.attribute(key, value)?;
        }
        self.end_element()
    }

    pub fn finish(mut self) -> Result<String, DocumentError> {
        if !self.open.is_empty() {
            return Err(DocumentError::Unclosed(std::mem::take(&mut self.open)));
        }
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}
