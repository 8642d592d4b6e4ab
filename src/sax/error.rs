use std::{borrow::Cow, sync::Arc};

use crate::error::{XMLError, XMLErrorDomain, XMLErrorLevel};

/// An error reported to [`SAXHandler`](crate::sax::handler::SAXHandler).
///
/// `line` and `column` are 1-based, or `-1` if the position is not available.
#[derive(Debug, Clone)]
pub struct SAXParseError {
    pub error: XMLError,
    pub domain: XMLErrorDomain,
    pub level: XMLErrorLevel,
    pub line: i64,
    pub column: i64,
    pub system_id: Arc<str>,
    pub public_id: Option<Arc<str>>,
    pub message: Cow<'static, str>,
}

impl std::fmt::Display for SAXParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[line:{},column:{}]:{}:{}:{}",
            self.system_id, self.line, self.column, self.domain, self.level, self.message,
        )
    }
}

impl std::error::Error for SAXParseError {}

/// Report an error through the handler of the reader `$reader`.
///
/// `$code` is either a variant name of [`XMLError`] or an expression of type
/// [`XMLError`].
macro_rules! generic_error {
    ($reader:expr, $level:expr, $code:expr, $message:literal, $( $args:expr ),+) => {{
        #[allow(unused_imports)]
        use $crate::error::XMLError::*;
        let error: $crate::error::XMLError = $code;
        $reader.report(
            $level,
            error,
            ::std::borrow::Cow::Owned(format!($message, $( $args ),+)),
        );
    }};
    ($reader:expr, $level:expr, $code:expr, $message:literal) => {{
        #[allow(unused_imports)]
        use $crate::error::XMLError::*;
        let error: $crate::error::XMLError = $code;
        $reader.report($level, error, ::std::borrow::Cow::Borrowed($message));
    }};
}

macro_rules! fatal_error {
    ($reader:expr, $code:expr, $message:literal $(, $args:expr )* $(,)?) => {
        $crate::sax::error::generic_error!(
            $reader,
            $crate::error::XMLErrorLevel::FatalError,
            $code,
            $message
            $(, $args )*
        )
    };
}

macro_rules! error {
    ($reader:expr, $code:expr, $message:literal $(, $args:expr )* $(,)?) => {
        $crate::sax::error::generic_error!(
            $reader,
            $crate::error::XMLErrorLevel::Error,
            $code,
            $message
            $(, $args )*
        )
    };
}

macro_rules! warning {
    ($reader:expr, $code:expr, $message:literal $(, $args:expr )* $(,)?) => {
        $crate::sax::error::generic_error!(
            $reader,
            $crate::error::XMLErrorLevel::Warning,
            $code,
            $message
            $(, $args )*
        )
    };
}

/// Namespace well-formedness errors are recoverable.
macro_rules! ns_error {
    ($reader:expr, $code:expr, $message:literal $(, $args:expr )* $(,)?) => {
        $crate::sax::error::generic_error!(
            $reader,
            $crate::error::XMLErrorLevel::Error,
            $code,
            $message
            $(, $args )*
        )
    };
}

/// Validity errors are fatal if `ParserOption::ValidityErrorsAreFatal` is enabled.
macro_rules! validity_error {
    ($reader:expr, $code:expr, $message:literal $(, $args:expr )* $(,)?) => {
        $crate::sax::error::generic_error!(
            $reader,
            $reader.validity_error_level(),
            $code,
            $message
            $(, $args )*
        )
    };
}

pub(crate) use {error, fatal_error, generic_error, ns_error, validity_error, warning};
