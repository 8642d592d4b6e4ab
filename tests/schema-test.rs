use std::{path::PathBuf, sync::Arc};

use strictxml::{
    error::{XMLError, XMLErrorDomain},
    grammar::{GrammarKey, GrammarPool, GrammarType, MemoryGrammarPool},
    sax::{
        handler::ErrorCollector,
        parser::{ParserOption, XMLReader, XMLReaderBuilder},
        source::InputSource,
    },
};

fn resource(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join(path)
}

fn schema_reader() -> XMLReader<ErrorCollector> {
    XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::SchemaValidation, true)
        .set_option(ParserOption::IdentityConstraintChecking, true)
        .build()
}

/// Parse `document` with `reader` and return the errors of this parse only.
fn validate(reader: &mut XMLReader<ErrorCollector>, document: &str) -> Vec<XMLError> {
    *reader.handler_mut() = ErrorCollector::new();
    reader.parse_str(document, None).unwrap();
    errors(reader)
}

fn errors(reader: &XMLReader<ErrorCollector>) -> Vec<XMLError> {
    let handler = reader.handler();
    handler
        .fatal_errors
        .iter()
        .chain(&handler.errors)
        .map(|error| error.error.clone())
        .collect()
}

const ORDER: &str = r#"<order xmlns="urn:order" xmlns:addr="urn:address"
       xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <shipTo>
    <addr:name>Bob</addr:name>
    <addr:street>1 Main Street</addr:street>
    <addr:city>Springfield</addr:city>
  </shipTo>
  <items>
    <item sku="123-AB"><product>Pen</product><quantity>2</quantity><price>1.5</price></item>
  </items>
</order>"#;

#[test]
fn schema_location_tests() {
    let mut reader = schema_reader();
    reader.parse_path(resource("schema/order.xml")).unwrap();
    assert_eq!(errors(&reader), []);
    assert!(reader.handler().warnings.is_empty());

    // both the hinted schema and its import are available after parsing
    let resolver = reader.resolver();
    let order = resolver
        .local_grammar(&GrammarKey::schema(Some("urn:order")))
        .unwrap();
    assert!(
        order
            .as_schema()
            .unwrap()
            .datatypes()
            .get_by_name(Some("urn:order"), "sku")
            .is_some()
    );
    assert!(
        resolver
            .local_grammar(&GrammarKey::schema(Some("urn:address")))
            .is_some()
    );
}

#[test]
fn invalid_document_tests() {
    let mut reader = schema_reader();
    reader.parse_path(resource("schema/order-invalid.xml")).unwrap();
    let errors = errors(&reader);
    for expected in [
        XMLError::SchemaValidAttributeValue,
        XMLError::SchemaValidFixedValue,
        XMLError::SchemaValidContentModel,
        XMLError::SchemaValidElementValue,
        XMLError::IdentityConstraintDuplicateKey,
        XMLError::IdentityConstraintUnresolvedKeyRef,
    ] {
        assert!(errors.contains(&expected), "{expected:?} is not reported");
    }
    // 'quantity' and 'price'
    let values = errors
        .iter()
        .filter(|&err| *err == XMLError::SchemaValidElementValue)
        .count();
    assert_eq!(values, 2);

    // identity constraints are checked only on request
    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::SchemaValidation, true)
        .build();
    reader.parse_path(resource("schema/order-invalid.xml")).unwrap();
    assert!(
        reader
            .handler()
            .errors
            .iter()
            .all(|error| error.domain != XMLErrorDomain::IdentityConstraint)
    );
}

#[test]
fn preloaded_grammar_tests() {
    let mut reader = schema_reader();
    let grammar = reader
        .load_grammar(
            InputSource::from_path(resource("schema/order.xsd")).unwrap(),
            GrammarType::Schema,
            false,
        )
        .unwrap();
    assert_eq!(grammar.key(), GrammarKey::schema(Some("urn:order")));

    let found = validate(&mut reader, ORDER);
    assert_eq!(found, []);

    // loaded grammars survive between documents
    let document = ORDER.replace("<quantity>2</quantity>", "<quantity>0</quantity>");
    let found = validate(&mut reader, &document);
    assert_eq!(found, [XMLError::SchemaValidElementValue]);

    let document = ORDER.replace("sku=\"123-AB\"", "sku=\"123-ab\"");
    let found = validate(&mut reader, &document);
    assert!(found.contains(&XMLError::SchemaValidAttributeValue));

    let document = ORDER.replace("<shipTo>", "<shipTo xsi:type=\"addr:unknown\">");
    let found = validate(&mut reader, &document);
    assert!(found.contains(&XMLError::SchemaValidXsiType));

    // 'xs:string' is not derived from 'addr:address'
    let document = ORDER.replace(
        "<shipTo>",
        "<shipTo xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" xsi:type=\"xs:string\">",
    );
    let found = validate(&mut reader, &document);
    assert!(found.contains(&XMLError::SchemaValidXsiType));

    // an unknown root element
    let found = validate(&mut reader, "<invoice xmlns=\"urn:order\"/>");
    assert_eq!(found, [XMLError::SchemaValidNoDeclaration]);
}

#[test]
fn wildcard_and_nil_tests() {
    let mut reader = schema_reader();
    reader
        .load_grammar(
            InputSource::from_path(resource("schema/order.xsd")).unwrap(),
            GrammarType::Schema,
            false,
        )
        .unwrap();

    // only foreign elements match '##other'
    let document = ORDER.replace(
        "</items>",
        "</items><extension><note>local</note></extension>",
    );
    let found = validate(&mut reader, &document);
    assert_eq!(found, [XMLError::SchemaValidContentModel]);

    let document = ORDER.replace(
        "</items>",
        "</items><extension><x:note xmlns:x=\"urn:x\" any=\"thing\"><x:deep/></x:note></extension>",
    );
    let found = validate(&mut reader, &document);
    assert_eq!(found, []);

    // a nil element must be empty
    let document = ORDER.replace("<items>", "<comment xsi:nil=\"true\">text</comment><items>");
    let found = validate(&mut reader, &document);
    assert!(found.contains(&XMLError::SchemaValidNil));

    // 'shipTo' is not nillable
    let document = ORDER.replace("<shipTo>", "<shipTo xsi:nil=\"true\">");
    let found = validate(&mut reader, &document);
    assert!(found.contains(&XMLError::SchemaValidNil));
}

#[test]
fn grammar_pool_tests() {
    let pool = Arc::new(MemoryGrammarPool::new());
    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::SchemaValidation, true)
        .set_option(ParserOption::CacheGrammarFromParse, true)
        .set_grammar_pool(pool.clone())
        .build();
    reader.parse_path(resource("schema/order.xml")).unwrap();
    assert!(!reader.handler().has_errors());
    assert!(pool.contains(&GrammarKey::schema(Some("urn:order"))));
    assert!(pool.contains(&GrammarKey::schema(Some("urn:address"))));

    // a document without hints is validated by the cached grammars
    let mut reader = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::SchemaValidation, true)
        .set_option(ParserOption::UseCachedGrammarInParse, true)
        .set_grammar_pool(pool.clone())
        .build();
    let found = validate(&mut reader, ORDER);
    assert_eq!(found, []);
    let document = ORDER.replace("<addr:city>Springfield</addr:city>", "");
    let found = validate(&mut reader, &document);
    assert_eq!(found, [XMLError::SchemaValidContentModel]);

    let cached = pool.retrieve_initial_grammar_set(GrammarType::Schema);
    assert_eq!(cached.len(), 2);
    assert!(pool.retrieve_initial_grammar_set(GrammarType::DTD).is_empty());
}

#[test]
fn schema_load_error_tests() {
    let mut reader = schema_reader();
    let err = reader
        .load_grammar(
            InputSource::from_content(
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="small">
    <xs:restriction base="xs:int">
      <xs:maxInclusive value="10"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="wider">
    <xs:restriction base="small">
      <xs:maxInclusive value="20"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#,
            ),
            GrammarType::Schema,
            false,
        )
        .unwrap_err();
    assert_eq!(err, XMLError::SchemaInvalidFacet);

    let err = reader
        .load_grammar(
            InputSource::from_content(
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="a">
    <xs:key name="k">
      <xs:selector xpath="../b"/>
      <xs:field xpath="@c"/>
    </xs:key>
  </xs:element>
</xs:schema>"#,
            ),
            GrammarType::Schema,
            false,
        )
        .unwrap_err();
    assert_eq!(err, XMLError::SchemaInvalidXPath);

    // a broken hint is a warning, and the document is then not validated
    let mut reader = schema_reader();
    reader
        .parse_str(
            r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
   xsi:noNamespaceSchemaLocation="no-such-file.xsd"/>"#,
            None,
        )
        .unwrap();
    assert!(!reader.handler().warnings.is_empty());
}

#[test]
fn schema_error_location_tests() {
    let mut reader = schema_reader();
    let mut source = InputSource::from_content(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="a" minOccurs="0"/>
        <xs:element name="a"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
    );
    source.set_system_id("urn:test:ambiguous.xsd");
    let err = reader
        .load_grammar(source, GrammarType::Schema, false)
        .unwrap_err();
    assert_eq!(err, XMLError::SchemaAmbiguousContentModel);
    let reported = reader
        .handler()
        .errors
        .iter()
        .find(|error| error.error == XMLError::SchemaAmbiguousContentModel)
        .unwrap();
    assert_eq!(&*reported.system_id, "urn:test:ambiguous.xsd");
    assert_eq!(reported.line, 3);
    assert!(reported.message.contains("'a' and 'a' compete"));
    assert!(reader.handler().fatal_errors.is_empty());

    // the facet of 'wider' is not a restriction of 'small'
    let mut reader = schema_reader();
    let err = reader
        .load_grammar(
            InputSource::from_content(
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="small">
    <xs:restriction base="xs:int">
      <xs:maxInclusive value="10"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="wider">
    <xs:restriction base="small">
      <xs:maxInclusive value="20"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#,
            ),
            GrammarType::Schema,
            false,
        )
        .unwrap_err();
    assert_eq!(err, XMLError::SchemaInvalidFacet);
    assert!(
        reader
            .handler()
            .errors
            .iter()
            .any(|error| error.error == XMLError::SchemaInvalidFacet && error.line == 7)
    );

    // a schema given by a hint reports its own location
    let mut reader = schema_reader();
    reader.parse_path(resource("schema/ambiguous.xml")).unwrap();
    let handler = reader.handler();
    let located = handler
        .errors
        .iter()
        .find(|error| error.error == XMLError::SchemaAmbiguousContentModel)
        .unwrap();
    assert!(located.system_id.ends_with("ambiguous.xsd"));
    assert_eq!(located.line, 3);
    assert!(!handler.warnings.is_empty());
}
