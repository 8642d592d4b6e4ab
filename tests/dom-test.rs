use std::{fmt::Write as _, path::PathBuf};

use strictxml::{
    dom::{DOMBuilder, Document, NodeId, NodeKind},
    error::XMLError,
    sax::{
        handler::ErrorCollector,
        parser::{ParserOption, XMLReaderBuilder},
    },
};

fn resource(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join(path)
}

fn walk_tree(out: &mut String, document: &Document, id: NodeId, depth: usize) {
    write!(out, "{}", "  ".repeat(depth)).unwrap();
    match document.kind(id).unwrap() {
        NodeKind::Document(_) => writeln!(out, "Document").unwrap(),
        NodeKind::DocumentType(doctype) => writeln!(
            out,
            "DocumentType({}, {})",
            doctype.name,
            doctype.system_id.as_deref().unwrap_or("None")
        )
        .unwrap(),
        NodeKind::Element(element) => {
            writeln!(
                out,
                "Element({}, {}, {})",
                element.qname(),
                element.local_name().unwrap_or("None"),
                element.namespace_uri().unwrap_or("None"),
            )
            .unwrap();
            for &att in element.attributes() {
                walk_tree(out, document, att, depth + 1);
            }
        }
        NodeKind::Attribute(att) => writeln!(
            out,
            "Attribute({}, {}, '{}', {})",
            att.qname(),
            att.namespace_uri().unwrap_or("None"),
            att.value(),
            att.is_specified()
        )
        .unwrap(),
        NodeKind::Text(text) => writeln!(out, "Text('{}')", text.escape_debug()).unwrap(),
        NodeKind::CDATASection(cdata) => writeln!(out, "CDATASection('{cdata}')").unwrap(),
        NodeKind::Comment(comment) => writeln!(out, "Comment('{comment}')").unwrap(),
        NodeKind::ProcessingInstruction(pi) => writeln!(
            out,
            "ProcessingInstruction({}, {})",
            pi.target,
            pi.data.as_deref().unwrap_or("None")
        )
        .unwrap(),
    }
    if let Ok(children) = document.children(id) {
        for &child in children {
            walk_tree(out, document, child, depth + 1);
        }
    }
}

#[test]
fn well_formed_tree_tests() {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DOMBuilder::with_handler(ErrorCollector::new()))
        .build();
    reader.parse_path(resource("well-formed/tags.xml")).unwrap();
    let builder = reader.into_handler();
    assert!(!builder.handler().has_errors());

    let document = builder.into_document();
    let mut out = String::new();
    walk_tree(&mut out, &document, NodeId::DOCUMENT, 0);
    assert_eq!(
        out,
        r#"Document
  Comment(' a comment before the root ')
  Element(root, root, urn:root)
    Attribute(xmlns, http://www.w3.org/2000/xmlns/, 'urn:root', true)
    Attribute(xmlns:x, http://www.w3.org/2000/xmlns/, 'urn:x', true)
    Text('\n  ')
    Element(x:child, child, urn:x)
      Attribute(x:attr, urn:x, 'value', true)
      Text('text & more')
      CDATASection(' <raw> ')
    Text('\n  ')
    Element(empty, empty, urn:root)
    Text('\n  ')
    ProcessingInstruction(target, some data)
    Text('\n')
"#
    );
}

#[test]
fn validated_tree_tests() {
    let mut builder = DOMBuilder::with_handler(ErrorCollector::new());
    builder.set_keep_ignorable_whitespace(false);
    let mut reader = XMLReaderBuilder::new()
        .set_handler(builder)
        .set_option(ParserOption::Validation, true)
        .build();
    reader.parse_path(resource("dtd/memo.xml")).unwrap();
    let builder = reader.into_handler();
    assert!(!builder.handler().has_errors());
    let document = builder.document();

    let doctype = document.doctype().unwrap();
    let doctype = document.as_document_type(doctype).unwrap();
    assert_eq!(doctype.name.as_ref(), "memo");
    assert_eq!(doctype.system_id.as_deref(), Some("memo.dtd"));

    let memo = document.document_element().unwrap();
    // no whitespace between the children of 'memo'
    let names = document
        .children(memo)
        .unwrap()
        .iter()
        .map(|&id| document.as_element(id).map(|element| element.qname()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(names, ["to", "to", "from", "body"]);

    assert_eq!(document.get_attribute(memo, "status").unwrap(), Some("draft"));
    assert_eq!(document.get_attribute(memo, "missing").unwrap(), None);
    let from = document.get_elements_by_qname(memo, "from").next().unwrap();
    assert_eq!(document.text_content(from).unwrap(), "Example & Co.");
    assert_eq!(
        document.text_content(memo).unwrap(),
        "AliceBobExample & Co.Meeting at noon."
    );

    // accessors check the kind of nodes
    assert_eq!(
        document.as_text(memo).unwrap_err(),
        XMLError::DOMNodeKindMismatch
    );
    assert_eq!(
        document.parent(memo).unwrap(),
        Some(NodeId::DOCUMENT)
    );
}
