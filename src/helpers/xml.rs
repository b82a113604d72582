//! XML streaming utilities for WordprocessingML parts.
//! Wraps `quick_xml::Reader` and adds attribute and text helpers used by the document reader.

use crate::error::MeetingGridError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Unknown entity '&{0};'")]
    UnknownEntity(String),

    #[error("Attribute '{0}' has unparsable value '{1}'")]
    AttributeValue(String, String),
}

/// Streaming XML reader with a reusable event buffer
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a reader that reports empty elements as start/end pairs and keeps whitespace,
    /// since `<w:t xml:space="preserve"> </w:t>` carries meaningful spaces.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader {
            reader,
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Reads the next XML event, `None` at end of input
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, MeetingGridError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(MeetingGridError::XmlError(error)),
        }
    }
}

/// Attribute lookup helpers for start tags
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets the unescaped value of an attribute by qualified name (e.g. `w:val`)
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, MeetingGridError>;

    /// Parses an attribute value into `T`
    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, MeetingGridError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, MeetingGridError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute_value(&attribute))
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&'a self, name: &str) -> Result<Option<T>, MeetingGridError> {
        match self.get_attribute_value(name)? {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| XmlError::AttributeValue(name.to_owned(), value.to_string()).into()),
            None => Ok(None),
        }
    }
}

fn attribute_value<'a>(attribute: &Attribute<'a>) -> Result<Cow<'a, str>, MeetingGridError> {
    Ok(attribute.unescape_value()?)
}

/// Helper trait for accumulating text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends a text node
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), MeetingGridError>;

    /// Appends an entity or character reference
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), MeetingGridError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), MeetingGridError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), MeetingGridError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::UnknownEntity(raw.to_string()))?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
