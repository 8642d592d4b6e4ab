use std::process::ExitCode;

use clap::Parser;
use strictxml::{
    dom::{DOMBuilder, Document, NodeId, NodeKind},
    error::{XMLError, XMLErrorDomain},
    grammar::GrammarType,
    sax::{
        handler::{DebugHandler, ErrorCollector, SAXHandler},
        parser::{ParserOption, XMLReader, XMLReaderBuilder},
        source::InputSource,
    },
};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the events reported by the parser, one per line.
    Inspect {
        #[clap(long, default_value = "sax", help = "parser mode for inspection")]
        mode: InspectMode,
        #[clap(long, help = "process namespaces")]
        namespaces: bool,
        document: Option<String>,
    },
    /// Validate a document and report every error.
    Validate {
        #[clap(long, help = "validation scheme")]
        mode: ValidationScheme,
        #[clap(long, help = "Path to the schema (unsupported for DTD)")]
        schema: Vec<String>,
        #[clap(long, help = "check xs:key, xs:keyref and xs:unique")]
        identity: bool,
        #[clap(long, help = "stop at the first validity error")]
        fatal: bool,
        document: Option<String>,
    },
    /// Print the element structure of a document.
    Outline {
        #[clap(long, help = "also show attributes")]
        attributes: bool,
        document: Option<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum InspectMode {
    #[clap(name = "sax")]
    SAX,
    #[clap(name = "sax-progressive")]
    SAXProgressive,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum ValidationScheme {
    #[clap(name = "dtd")]
    DTD,
    #[clap(name = "schema")]
    Schema,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Inspect {
            mode,
            namespaces,
            document,
        } => do_inspect_command(mode, namespaces, document),
        Command::Validate {
            mode,
            schema,
            identity,
            fatal,
            document,
        } => do_validate_command(mode, schema, identity, fatal, document),
        Command::Outline {
            attributes,
            document,
        } => do_outline_command(attributes, document),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn open(document: Option<&str>) -> Result<InputSource, XMLError> {
    match document {
        Some(path) => InputSource::from_path(path),
        None => {
            let mut source = InputSource::from_reader(std::io::stdin(), None)?;
            source.set_system_id("[stdin]");
            Ok(source)
        }
    }
}

fn parse<H: SAXHandler>(reader: &mut XMLReader<H>, document: Option<&str>) -> Result<(), XMLError> {
    let source = open(document)?;
    reader.scan_document(source)
}

fn do_inspect_command(
    mode: InspectMode,
    namespaces: bool,
    document: Option<String>,
) -> Result<ExitCode, XMLError> {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DebugHandler::default())
        .set_option(ParserOption::Namespaces, namespaces)
        .build();
    let result = match mode {
        InspectMode::SAX => {
            let result = parse(&mut reader, document.as_deref());
            print!("{}", reader.handler().buffer);
            result
        }
        InspectMode::SAXProgressive => {
            let source = open(document.as_deref())?;
            let mut step = reader.scan_first(source);
            loop {
                let buffer = &mut reader.handler_mut().buffer;
                if !buffer.is_empty() {
                    print!("{buffer}");
                    buffer.clear();
                }
                match step {
                    Ok(true) => step = reader.scan_next(),
                    Ok(false) => break Ok(()),
                    Err(err) => break Err(err),
                }
            }
        }
    };
    Ok(match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

fn do_validate_command(
    mode: ValidationScheme,
    schema: Vec<String>,
    identity: bool,
    fatal: bool,
    document: Option<String>,
) -> Result<ExitCode, XMLError> {
    let builder = XMLReaderBuilder::new()
        .set_handler(ErrorCollector::new())
        .set_option(ParserOption::Namespaces, true)
        .set_option(ParserOption::ValidityErrorsAreFatal, fatal);
    let mut reader = match mode {
        ValidationScheme::DTD => {
            if !schema.is_empty() {
                eprintln!("'--schema' flag is unsupported for DTD.");
                return Ok(ExitCode::FAILURE);
            }
            builder.set_option(ParserOption::Validation, true).build()
        }
        ValidationScheme::Schema => {
            let mut reader = builder
                .set_option(ParserOption::SchemaValidation, true)
                .set_option(ParserOption::IdentityConstraintChecking, identity)
                .build();
            for path in &schema {
                let grammar =
                    reader.load_grammar(InputSource::from_path(path)?, GrammarType::Schema, false)?;
                log::info!("loaded the grammar {} from '{path}'", grammar.key());
            }
            reader
        }
    };

    let result = parse(&mut reader, document.as_deref());
    let name = document.as_deref().unwrap_or("a document from stdin");
    let handler = reader.handler();
    for error in handler.iter() {
        eprintln!("{error}");
    }
    let valid = result.is_ok()
        && !handler.errors.iter().any(|error| {
            matches!(
                error.domain,
                XMLErrorDomain::DTDValid
                    | XMLErrorDomain::SchemaValid
                    | XMLErrorDomain::IdentityConstraint
                    | XMLErrorDomain::Namespace
                    | XMLErrorDomain::Datatype
            )
        });
    if valid {
        eprintln!("{name} is successfully validated");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "validation of {name} is failed: {} error(s), {} fatal error(s)",
            handler.errors.len(),
            handler.fatal_errors.len()
        );
        Ok(ExitCode::FAILURE)
    }
}

fn do_outline_command(attributes: bool, document: Option<String>) -> Result<ExitCode, XMLError> {
    let mut reader = XMLReaderBuilder::new()
        .set_handler(DOMBuilder::with_handler(ErrorCollector::new()))
        .set_option(ParserOption::Namespaces, true)
        .build();
    let result = parse(&mut reader, document.as_deref());
    let builder = reader.into_handler();
    for error in builder.handler().iter() {
        eprintln!("{error}");
    }
    result?;

    let document = builder.document();
    if let Some(doctype) = document.doctype() {
        let doctype = document.as_document_type(doctype)?;
        println!("<!DOCTYPE {}>", doctype.name);
    }
    if let Some(root) = document.document_element() {
        print_outline(document, root, 0, attributes)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn print_outline(
    document: &Document,
    id: NodeId,
    depth: usize,
    show_attributes: bool,
) -> Result<(), XMLError> {
    let element = document.as_element(id)?;
    print!("{:indent$}{}", "", element.qname(), indent = depth * 2);
    if let Some(uri) = element.namespace_uri() {
        print!(" {{{uri}}}");
    }
    if show_attributes {
        for &att in element.attributes() {
            let att = document.as_attribute(att)?;
            let mark = if att.is_specified() { "" } else { " (default)" };
            print!(" {}=\"{}\"{mark}", att.qname(), att.value());
        }
    }

    let mut text = 0;
    let mut children = vec![];
    for &child in document.children(id)? {
        match document.kind(child)? {
            NodeKind::Element(_) => children.push(child),
            NodeKind::Text(data) | NodeKind::CDATASection(data) => {
                text += data.trim().chars().count()
            }
            _ => {}
        }
    }
    if text > 0 {
        print!(" [{text} chars]");
    }
    println!();
    for child in children {
        print_outline(document, child, depth + 1, show_attributes)?;
    }
    Ok(())
}
