//! Event based (SAX2-like) parser.
//!
//! [`XMLReader`](crate::sax::parser::XMLReader) reads a document from an
//! [`InputSource`](crate::sax::source::InputSource) and reports its content to a
//! [`SAXHandler`](crate::sax::handler::SAXHandler). Well-formedness errors, DTD validity
//! errors and XML Schema validity errors are all reported through the same handler.

pub mod attributes;
pub mod error;
pub mod handler;
pub mod parser;
pub mod source;

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicUsize, Ordering},
};

/// The current position of a reader.
///
/// A locator is shared with the handler through
/// [`SAXHandler::set_document_locator`](crate::sax::handler::SAXHandler::set_document_locator),
/// so it can be read while events are delivered.
pub struct Locator {
    system_id: RwLock<Arc<str>>,
    public_id: RwLock<Option<Arc<str>>>,
    line: AtomicUsize,
    column: AtomicUsize,
}

impl Locator {
    pub(crate) fn new(
        system_id: Arc<str>,
        public_id: Option<Arc<str>>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            system_id: RwLock::new(system_id),
            public_id: RwLock::new(public_id),
            line: line.into(),
            column: column.into(),
        }
    }

    pub fn system_id(&self) -> Arc<str> {
        self.system_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn public_id(&self) -> Option<Arc<str>> {
        self.public_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn line(&self) -> usize {
        self.line.load(Ordering::Acquire)
    }

    pub fn column(&self) -> usize {
        self.column.load(Ordering::Acquire)
    }

    pub(crate) fn set_system_id(&self, system_id: Arc<str>) {
        *self
            .system_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = system_id;
    }

    pub(crate) fn set_public_id(&self, public_id: Option<Arc<str>>) {
        *self
            .public_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = public_id;
    }

    pub(crate) fn set_line(&self, line: usize) {
        self.line.store(line, Ordering::Release);
    }

    pub(crate) fn set_column(&self, column: usize) {
        self.column.store(column, Ordering::Release);
    }

    pub(crate) fn update_line(&self, f: impl Fn(usize) -> usize) {
        while self
            .line
            .fetch_update(Ordering::Release, Ordering::Acquire, |line| Some(f(line)))
            .is_err()
        {}
    }

    pub(crate) fn update_column(&self, f: impl Fn(usize) -> usize) {
        while self
            .column
            .fetch_update(Ordering::Release, Ordering::Acquire, |column| {
                Some(f(column))
            })
            .is_err()
        {}
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("system_id", &self.system_id())
            .field("public_id", &self.public_id())
            .field("line", &self.line())
            .field("column", &self.column())
            .finish()
    }
}
