use std::{io::Cursor, path::PathBuf};

use strictxml::{
    error::XMLError,
    sax::{
        handler::{DebugHandler, ErrorCollector},
        parser::{ParserState, XMLReaderBuilder},
        source::InputSource,
    },
};

fn resource(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join(path)
}

fn debug_reader() -> strictxml::sax::parser::XMLReader<DebugHandler<ErrorCollector>> {
    XMLReaderBuilder::new()
        .set_handler(DebugHandler::new(ErrorCollector::new()))
        .build()
}

#[test]
fn well_formed_tests() {
    let mut reader = debug_reader();
    reader.parse_path(resource("well-formed/tags.xml")).unwrap();
    assert_eq!(reader.state(), ParserState::Done);

    let handler = reader.into_handler();
    assert!(!handler.child.has_errors());
    let buffer = handler.buffer;
    assert!(buffer.starts_with("setDocumentLocator()\n"));
    assert!(buffer.contains("declaration(1.0, None, None)\n"));
    assert!(buffer.contains("comment( a comment before the root )\n"));
    assert!(buffer.contains("startPrefixMapping(Some(\"x\"), urn:x)\n"));
    assert!(buffer.contains(
        "startElement(Some(\"urn:x\"), Some(\"child\"), x:child, {urn:x}attr='value')\n"
    ));
    assert!(buffer.contains("startCDATA()\n"));
    assert!(buffer.contains("characters( <raw> )\n"));
    assert!(buffer.contains("endElement(Some(\"urn:root\"), Some(\"empty\"), empty)\n"));
    assert!(buffer.contains("processingInstruction(target, Some(\"some data\"))\n"));
    assert!(buffer.ends_with("endDocument()\n"));
}

#[test]
fn progressive_tests() {
    let document = r#"<?xml version="1.0"?>
<!DOCTYPE doc [
  <!ENTITY greeting "Hello, &who;!">
  <!ENTITY who "world">
]>
<doc a="1">&greeting;<child/><!-- c --><?pi?></doc>"#;

    let mut whole = debug_reader();
    whole.parse_str(document, None).unwrap();
    let whole = whole.into_handler().buffer;

    let mut stepwise = debug_reader();
    let mut steps = 0;
    let mut more = stepwise
        .scan_first(InputSource::from_content(document))
        .unwrap();
    while more {
        steps += 1;
        more = stepwise.scan_next().unwrap();
    }
    assert!(steps > 1);
    assert_eq!(stepwise.state(), ParserState::Done);
    assert_eq!(stepwise.into_handler().buffer, whole);
    assert!(whole.contains("startEntity(greeting)\n"));
}

#[test]
fn entity_tests() {
    let mut reader = debug_reader();
    reader
        .parse_str(
            r#"<!DOCTYPE a [<!ENTITY x "<b>&#x41;&lt;</b>">]><a>&x;</a>"#,
            None,
        )
        .unwrap();
    let handler = reader.into_handler();
    assert!(!handler.child.has_errors());
    assert!(handler.buffer.contains("startElement(None, Some(\"b\"), b)\n"));
    let text = handler
        .buffer
        .lines()
        .filter_map(|line| line.strip_prefix("characters(")?.strip_suffix(')'))
        .collect::<String>();
    assert_eq!(text, "A<");

    // recursion is fatal
    let mut reader = debug_reader();
    let err = reader
        .parse_str(
            r#"<!DOCTYPE a [<!ENTITY x "&y;"><!ENTITY y "&x;">]><a>&x;</a>"#,
            None,
        )
        .unwrap_err();
    assert_eq!(err, XMLError::ParserEntityRecursion);
    assert_eq!(reader.state(), ParserState::FatalErrorOccurred);
    assert!(!reader.handler().buffer.contains("endDocument()"));

    // an undeclared entity without any DTD is not well-formed
    let mut reader = debug_reader();
    assert!(reader.parse_str("<a>&unknown;</a>", None).is_err());
}

#[test]
fn line_end_tests() {
    let mut reader = debug_reader();
    reader
        .parse_reader(Cursor::new(b"<a>\r\ntext\r</a>".to_vec()), None, None)
        .unwrap();
    let handler = reader.into_handler();
    assert!(!handler.child.has_errors());
    assert!(!handler.buffer.contains('\r'));
    assert!(handler.buffer.contains("characters(\ntext\n)\n"));

    // attribute values and CDATA sections of in-memory documents, too
    let mut reader = debug_reader();
    reader
        .parse_str("<a b='x\r\ny'>1\r\r2<![CDATA[3\r\n4]]></a>", None)
        .unwrap();
    let buffer = reader.into_handler().buffer;
    assert!(!buffer.contains('\r'));
    assert!(buffer.contains("{}b='x y'"));
    assert!(buffer.contains("characters(1\n\n2)\n"));
    assert!(buffer.contains("characters(3\n4)\n"));
}

#[test]
fn fatal_error_tests() {
    let mut reader = debug_reader();
    let err = reader.parse_str("<a><b></a>", None).unwrap_err();
    assert_eq!(err, XMLError::ParserMismatchElementType);
    let handler = reader.into_handler();
    assert_eq!(handler.child.fatal_errors.len(), 1);
    assert_eq!(handler.child.fatal_errors[0].line, 1);

    let mut reader = debug_reader();
    assert!(reader.parse_str("<a/><b/>", None).is_err());

    let mut reader = debug_reader();
    assert!(reader.parse_str("<a x='1' x='2'/>", None).is_err());

    // the reader can be reused after a fatal error
    let mut reader = debug_reader();
    assert!(reader.parse_str("<a>", None).is_err());
    reader.parse_str("<a/>", None).unwrap();
    assert_eq!(reader.state(), ParserState::Done);
}

#[test]
fn namespace_error_tests() {
    let mut reader = debug_reader();
    reader.parse_str("<x:a y:b='1'/>", None).ok();
    let errors = reader
        .handler()
        .child
        .iter()
        .filter(|error| error.error == XMLError::ParserUndefinedNamespace)
        .count();
    assert_eq!(errors, 2);
}

#[test]
fn encoding_tests() {
    // UTF-16LE with a byte order mark
    let mut bytes = vec![0xFF, 0xFE];
    for unit in r#"<?xml version="1.0" encoding="UTF-16"?><a>caf&#xE9; é</a>"#.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let mut reader = debug_reader();
    reader.parse_reader(Cursor::new(bytes), None, None).unwrap();
    let text = reader
        .handler()
        .buffer
        .lines()
        .filter_map(|line| line.strip_prefix("characters(")?.strip_suffix(')'))
        .collect::<String>();
    assert_eq!(text, "café é");

    // ISO-8859-1 is detected from the encoding declaration
    let mut bytes = br#"<?xml version="1.0" encoding="ISO-8859-1"?><a>"#.to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"</a>");
    let mut reader = debug_reader();
    reader.parse_reader(Cursor::new(bytes), None, None).unwrap();
    assert!(reader.handler().buffer.contains("characters(é)\n"));

    // a forced encoding overrides the declaration
    let mut reader = debug_reader();
    reader
        .parse_reader(
            Cursor::new(br#"<?xml version="1.0" encoding="UTF-16"?><a/>"#.to_vec()),
            Some("UTF-8"),
            None,
        )
        .unwrap();

    let mut reader = debug_reader();
    assert!(
        reader
            .parse_reader(Cursor::new(b"<a/>".to_vec()), Some("x-unknown"), None)
            .is_err()
    );
}
