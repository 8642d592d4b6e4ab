use std::sync::Arc;

use strictxml_automata::xsregexp::RegexpError;

use crate::{
    datatype::DatatypeError, encoding::DecodeError, validation::content_model::ContentModelError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XMLErrorLevel {
    FatalError,
    Error,
    Warning,
}

impl std::fmt::Display for XMLErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::FatalError => write!(f, "fatal error"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XMLErrorDomain {
    Parser,
    Namespace,
    DTDValid,
    SchemaParser,
    SchemaValid,
    IdentityConstraint,
    Datatype,
    Grammar,
    Pool,
    DOM,
}

impl std::fmt::Display for XMLErrorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Parser => write!(f, "parser"),
            Self::Namespace => write!(f, "namespace"),
            Self::DTDValid => write!(f, "dtd-valid"),
            Self::SchemaParser => write!(f, "schema-parser"),
            Self::SchemaValid => write!(f, "schema-valid"),
            Self::IdentityConstraint => write!(f, "identity-constraint"),
            Self::Datatype => write!(f, "datatype"),
            Self::Grammar => write!(f, "grammar"),
            Self::Pool => write!(f, "pool"),
            Self::DOM => write!(f, "dom"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum XMLError {
    // general errors
    InternalError,
    UnsupportedError,
    // parser errors
    ParserUnsupportedEncoding,
    ParserUnsupportedXMLVersion,
    ParserTooLongXMLVersionNumber,
    ParserTooLongEncodingName,
    ParserEmptyName,
    ParserEmptyNmtoken,
    ParserEmptyQName,
    ParserEmptyQNamePrefix,
    ParserEmptyQNameLocalPart,
    ParserInvalidQNameSeparator,
    ParserIncorrectLiteralQuotation,
    ParserInvalidSystemLiteral,
    ParserInvalidPubidLiteral,
    ParserInvalidAttValue,
    ParserInvalidExternalID,
    ParserInvalidCharacter,
    ParserInvalidXMLDecl,
    ParserInvalidTextDecl,
    ParserInvalidXMLVersion,
    ParserInvalidEncodingDecl,
    ParserInvalidEncodingName,
    ParserInvalidSDDecl,
    ParserInvalidComment,
    ParserInvalidCDSect,
    ParserInvalidProcessingInstruction,
    ParserUnacceptablePITarget,
    ParserUnacceptablePatternInCharData,
    ParserInvalidDoctypeDecl,
    ParserInvalidElementDecl,
    ParserInvalidAttlistDecl,
    ParserInvalidEntityDecl,
    ParserInvalidNotationDecl,
    ParserInvalidConditionalSect,
    ParserInvalidStartOrEmptyTag,
    ParserInvalidEndTag,
    ParserMismatchElementType,
    ParserDuplicateAttributes,
    ParserInvalidCharacterReference,
    ParserInvalidEntityReference,
    ParserEntityNotFound,
    ParserEntityRecursion,
    ParserEntityIncorrectNesting,
    ParserUndeclaredEntityReference,
    ParserUnparsedEntityReference,
    ParserExternalEntityInAttribute,
    ParserPEReferenceInInternalSubsetMarkup,
    ParserUnacceptableNamespaceName,
    ParserUndefinedNamespace,
    ParserUnexpectedDocumentContent,
    ParserUnexpectedEOF,
    // DTD validity errors
    ParserInvalidStandaloneDocument,
    ParserDuplicateElementDecl,
    ParserAmbiguousElementContentModel,
    ParserDuplicateMixedContent,
    ParserDuplicateTokensInAttlistDecl,
    ParserMultipleIDAttributePerElement,
    ParserMultipleNotationAttributePerElement,
    ParserNotationAttlistDeclOnEmptyElement,
    ParserIDAttributeWithDefault,
    ParserInvalidAttributeDefault,
    ParserUndeclaredNotation,
    ParserMismatchRootElementType,
    ParserMismatchElementContentModel,
    ParserUndeclaredElement,
    ParserUndeclaredAttribute,
    ParserInvalidAttributeValue,
    ParserDuplicateIDAttribute,
    ParserUnresolvableIDReference,
    ParserUnacceptableNotationAttribute,
    ParserUnacceptableEnumerationAttribute,
    ParserUndeclaredUnparsedEntity,
    ParserMismatchFixedDefaultAttributeValue,
    ParserRequiredAttributeNotFound,
    ParserDoctypeDeclNotFound,
    // I/O errors
    IOError(Arc<std::io::Error>),
    IONotFound,
    // encoding errors
    DecodeError(DecodeError),
    // string pool errors
    PoolIdNotFound,
    // grammar errors
    GrammarNotMutable,
    GrammarDuplicateCache,
    GrammarPoolLocked,
    GrammarNotFound,
    // content model errors
    ContentModel(ContentModelError),
    // schema definition errors
    SchemaInvalidFacet,
    SchemaFinalDerivation,
    SchemaInvalidXPath,
    SchemaInvalidRegexp(RegexpError),
    SchemaUnresolvedReference,
    SchemaDuplicateDeclaration,
    SchemaInvalidAttribute,
    SchemaMissingAttribute,
    SchemaUnexpectedElement,
    SchemaAmbiguousContentModel,
    SchemaInvalidDerivation,
    SchemaInvalidOccurrence,
    SchemaCircularDefinition,
    SchemaLoadFailure,
    SchemaNamespaceMismatch,
    // schema validity errors
    SchemaValidNoDeclaration,
    SchemaValidContentModel,
    SchemaValidUndeclaredAttribute,
    SchemaValidRequiredAttribute,
    SchemaValidProhibitedAttribute,
    SchemaValidAttributeValue,
    SchemaValidElementValue,
    SchemaValidFixedValue,
    SchemaValidNil,
    SchemaValidXsiType,
    SchemaValidAbstract,
    SchemaValidTextNotAllowed,
    SchemaValidElementNotAllowed,
    // datatype errors
    Datatype(DatatypeError),
    // identity constraint errors
    IdentityConstraintDuplicateKey,
    IdentityConstraintIncompleteKey,
    IdentityConstraintUnresolvedKeyRef,
    IdentityConstraintFieldMultipleMatch,
    // DOM errors
    DOMNodeKindMismatch,
    DOMInvalidNodeId,
}

impl XMLError {
    /// The domain this error belongs to when it is reported through a handler.
    pub fn domain(&self) -> XMLErrorDomain {
        use XMLError::*;

        match self {
            ParserUndefinedNamespace | ParserUnacceptableNamespaceName => {
                XMLErrorDomain::Namespace
            }
            ParserInvalidStandaloneDocument
            | ParserDuplicateElementDecl
            | ParserAmbiguousElementContentModel
            | ParserDuplicateMixedContent
            | ParserDuplicateTokensInAttlistDecl
            | ParserMultipleIDAttributePerElement
            | ParserMultipleNotationAttributePerElement
            | ParserNotationAttlistDeclOnEmptyElement
            | ParserIDAttributeWithDefault
            | ParserInvalidAttributeDefault
            | ParserUndeclaredNotation
            | ParserMismatchRootElementType
            | ParserMismatchElementContentModel
            | ParserUndeclaredElement
            | ParserUndeclaredAttribute
            | ParserInvalidAttributeValue
            | ParserDuplicateIDAttribute
            | ParserUnresolvableIDReference
            | ParserUnacceptableNotationAttribute
            | ParserUnacceptableEnumerationAttribute
            | ParserUndeclaredUnparsedEntity
            | ParserMismatchFixedDefaultAttributeValue
            | ParserRequiredAttributeNotFound
            | ParserDoctypeDeclNotFound => XMLErrorDomain::DTDValid,
            PoolIdNotFound => XMLErrorDomain::Pool,
            GrammarNotMutable | GrammarDuplicateCache | GrammarPoolLocked | GrammarNotFound => {
                XMLErrorDomain::Grammar
            }
            ContentModel(_)
            | SchemaInvalidFacet
            | SchemaFinalDerivation
            | SchemaInvalidXPath
            | SchemaInvalidRegexp(_)
            | SchemaUnresolvedReference
            | SchemaDuplicateDeclaration
            | SchemaInvalidAttribute
            | SchemaMissingAttribute
            | SchemaUnexpectedElement
            | SchemaAmbiguousContentModel
            | SchemaInvalidDerivation
            | SchemaInvalidOccurrence
            | SchemaCircularDefinition
            | SchemaLoadFailure
            | SchemaNamespaceMismatch => XMLErrorDomain::SchemaParser,
            SchemaValidNoDeclaration
            | SchemaValidContentModel
            | SchemaValidUndeclaredAttribute
            | SchemaValidRequiredAttribute
            | SchemaValidProhibitedAttribute
            | SchemaValidAttributeValue
            | SchemaValidElementValue
            | SchemaValidFixedValue
            | SchemaValidNil
            | SchemaValidXsiType
            | SchemaValidAbstract
            | SchemaValidTextNotAllowed
            | SchemaValidElementNotAllowed => XMLErrorDomain::SchemaValid,
            Datatype(_) => XMLErrorDomain::Datatype,
            IdentityConstraintDuplicateKey
            | IdentityConstraintIncompleteKey
            | IdentityConstraintUnresolvedKeyRef
            | IdentityConstraintFieldMultipleMatch => XMLErrorDomain::IdentityConstraint,
            DOMNodeKindMismatch | DOMInvalidNodeId => XMLErrorDomain::DOM,
            _ => XMLErrorDomain::Parser,
        }
    }
}

impl std::fmt::Display for XMLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for XMLError {}

impl PartialEq for XMLError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // I/O errors are compared only by their kinds
            (Self::IOError(l), Self::IOError(r)) => l.kind() == r.kind(),
            (Self::DecodeError(l), Self::DecodeError(r)) => l == r,
            (Self::ContentModel(l), Self::ContentModel(r)) => l == r,
            (Self::SchemaInvalidRegexp(l), Self::SchemaInvalidRegexp(r)) => l == r,
            (Self::Datatype(l), Self::Datatype(r)) => l == r,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for XMLError {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::NotFound {
            Self::IONotFound
        } else {
            Self::IOError(Arc::new(value))
        }
    }
}

impl From<DecodeError> for XMLError {
    fn from(value: DecodeError) -> Self {
        Self::DecodeError(value)
    }
}

impl From<ContentModelError> for XMLError {
    fn from(value: ContentModelError) -> Self {
        Self::ContentModel(value)
    }
}

impl From<DatatypeError> for XMLError {
    fn from(value: DatatypeError) -> Self {
        Self::Datatype(value)
    }
}

impl From<RegexpError> for XMLError {
    fn from(value: RegexpError) -> Self {
        Self::SchemaInvalidRegexp(value)
    }
}
