use std::{path::PathBuf, sync::Arc};

use strictxml::{
    error::{XMLError, XMLErrorDomain},
    grammar::{GrammarPool, GrammarType, MemoryGrammarPool},
    sax::{
        handler::{DebugHandler, ErrorCollector},
        parser::{ParserOption, XMLReader, XMLReaderBuilder},
        source::InputSource,
    },
};

fn resource(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join(path)
}

fn validating_reader() -> XMLReader<DebugHandler<ErrorCollector>> {
    XMLReaderBuilder::new()
        .set_handler(DebugHandler::new(ErrorCollector::new()))
        .set_option(ParserOption::Validation, true)
        .build()
}

fn errors(reader: &XMLReader<DebugHandler<ErrorCollector>>) -> Vec<XMLError> {
    reader
        .handler()
        .child
        .errors
        .iter()
        .map(|error| error.error.clone())
        .collect()
}

#[test]
fn valid_document_tests() {
    let mut reader = validating_reader();
    reader.parse_path(resource("dtd/memo.xml")).unwrap();
    assert_eq!(errors(&reader), []);

    let buffer = &reader.handler().buffer;
    // the default of 'status' is reported with the specified attributes
    assert!(buffer.contains("{}status='draft'"));
    assert!(buffer.contains("startEntity(company)\n"));
    // whitespace in element content
    assert!(buffer.contains("ignorableWhitespace(\n  )\n"));

    let dtd = reader.dtd().unwrap();
    assert!(dtd.get_elem_decl("memo").is_some());
    // the IGNORE section has no effect
    assert!(dtd.get_elem_decl("body").is_some());
}

#[test]
fn invalid_document_tests() {
    let mut reader = validating_reader();
    // validity errors are not fatal
    reader.parse_path(resource("dtd/memo-invalid.xml")).unwrap();
    let errors = errors(&reader);
    for expected in [
        XMLError::ParserRequiredAttributeNotFound,
        XMLError::ParserUnacceptableEnumerationAttribute,
        XMLError::ParserMismatchElementContentModel,
        XMLError::ParserUndeclaredElement,
        XMLError::ParserUnresolvableIDReference,
    ] {
        assert!(errors.contains(&expected), "{expected:?} is not reported");
    }
    // 'note' appears twice, but is reported once
    let undeclared = errors
        .iter()
        .filter(|&err| *err == XMLError::ParserUndeclaredElement)
        .count();
    assert_eq!(undeclared, 1);
    assert!(
        reader
            .handler()
            .child
            .errors
            .iter()
            .all(|error| error.domain == XMLErrorDomain::DTDValid)
    );

    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::Validation, true)
        .set_option(ParserOption::ValidityErrorsAreFatal, true)
        .build();
    let err = reader
        .parse_path(resource("dtd/memo-invalid.xml"))
        .unwrap_err();
    // specified attributes are checked before the missing ones
    assert_eq!(err, XMLError::ParserUnacceptableEnumerationAttribute);
    assert!(
        reader
            .handler()
            .fatal_errors
            .iter()
            .any(|error| error.error == XMLError::ParserUnacceptableEnumerationAttribute)
    );
}

#[test]
fn internal_subset_tests() {
    let mut reader = validating_reader();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
  <!ELEMENT a EMPTY>
  <!ATTLIST a fixed CDATA #FIXED "yes">
]>
<b fixed="no"/>"#,
            None,
        )
        .unwrap();
    let found = errors(&reader);
    assert!(found.contains(&XMLError::ParserMismatchRootElementType));
    assert!(found.contains(&XMLError::ParserUndeclaredElement));

    let mut reader = validating_reader();
    reader
        .parse_str(
            r#"<!DOCTYPE a [
  <!ELEMENT a (b*)>
  <!ELEMENT b EMPTY>
  <!ATTLIST b fixed CDATA #FIXED "yes" ref IDREF #IMPLIED key ID #IMPLIED>
]>
<a><b fixed="no" key="k1"/><b key="k1" ref="k1"/><b>text</b></a>"#,
            None,
        )
        .unwrap();
    let found = errors(&reader);
    assert!(found.contains(&XMLError::ParserMismatchFixedDefaultAttributeValue));
    assert!(found.contains(&XMLError::ParserDuplicateIDAttribute));
    assert!(found.contains(&XMLError::ParserMismatchElementContentModel));
    assert!(!found.contains(&XMLError::ParserUnresolvableIDReference));

    // no validation without a document type declaration
    let mut reader = validating_reader();
    reader.parse_str("<a/>", None).unwrap();
    assert_eq!(
        reader.handler().child.iter().map(|e| e.error.clone()).collect::<Vec<_>>(),
        [XMLError::ParserDoctypeDeclNotFound]
    );
}

#[test]
fn grammar_cache_tests() {
    let pool = Arc::new(MemoryGrammarPool::new());
    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::Validation, true)
        .set_option(ParserOption::CacheGrammarFromParse, true)
        .set_grammar_pool(pool.clone())
        .build();
    reader.parse_path(resource("dtd/memo.xml")).unwrap();
    assert!(!reader.handler().has_errors());
    assert_eq!(pool.len(), 1);
    assert!(
        pool.retrieve_initial_grammar_set(GrammarType::DTD)[0]
            .as_dtd()
            .is_some_and(|dtd| dtd.get_elem_decl("memo").is_some())
    );

    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::new(ErrorCollector::new()))
        .set_option(ParserOption::Validation, true)
        .set_option(ParserOption::UseCachedGrammarInParse, true)
        .set_grammar_pool(pool.clone())
        .build();
    reader.parse_path(resource("dtd/memo-invalid.xml")).unwrap();
    assert!(errors(&reader).contains(&XMLError::ParserRequiredAttributeNotFound));

    // a locked pool accepts nothing
    pool.clear();
    pool.lock();
    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::Validation, true)
        .set_option(ParserOption::CacheGrammarFromParse, true)
        .set_grammar_pool(pool.clone())
        .build();
    reader.parse_path(resource("dtd/memo.xml")).unwrap();
    assert!(pool.is_empty());
    assert!(
        reader
            .handler()
            .warnings
            .iter()
            .any(|warning| warning.error == XMLError::GrammarPoolLocked)
    );
}

#[test]
fn load_grammar_tests() {
    let mut reader = validating_reader();
    let grammar = reader
        .load_grammar(
            InputSource::from_path(resource("dtd/memo.dtd")).unwrap(),
            GrammarType::DTD,
            false,
        )
        .unwrap();
    let dtd = grammar.as_dtd().unwrap();
    assert!(dtd.get_elem_decl("to").is_some());
    assert!(dtd.get_entity("company").is_some());
}
