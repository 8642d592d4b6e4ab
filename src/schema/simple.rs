use std::sync::Arc;

use crate::{
    XML_SCHEMA_NAMESPACE, XML_XML_NAMESPACE,
    datatype::{DatatypeValidator, DerivationSet, FacetKind, FacetValue, TypeName},
    error::XMLError,
    util::StringTokenizer,
};

use super::{Component, SchemaBuilder};

impl SchemaBuilder<'_> {
    fn builtin(&self, local_name: &str) -> Option<Arc<DatatypeValidator>> {
        self.resolver.environment().builtin_types().get(local_name)
    }

    pub(super) fn any_simple_type(&self) -> Result<Arc<DatatypeValidator>, XMLError> {
        self.builtin("anySimpleType").ok_or(XMLError::InternalError)
    }

    /// Find or build the named simple type `name`.
    pub(super) fn simple_type_by_name(
        &mut self,
        name: &TypeName,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        if name.namespace() == Some(XML_SCHEMA_NAMESPACE) {
            return self
                .builtin(&name.local_name)
                .ok_or(XMLError::SchemaUnresolvedReference);
        }
        if name.namespace() == self.target_namespace() {
            if let Some(dv) = self.grammar.datatypes().get(name) {
                return Ok(dv);
            }
            let Some(&comp) = self.simple_types.get(name) else {
                log::warn!("the simple type '{name}' is not defined");
                return Err(XMLError::SchemaUnresolvedReference);
            };
            if !self.building.insert(name.clone()) {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaCircularDefinition,
                    format_args!("the simple type '{name}' is defined through itself"),
                ));
            }
            let dv = self.simple_type(comp, Some(name.clone()));
            self.building.remove(name);
            return dv;
        }
        self.foreign_grammar(name.namespace())
            .and_then(|grammar| grammar.as_schema()?.datatypes().get(name))
            .ok_or_else(|| {
                log::warn!("the simple type '{name}' is not defined");
                XMLError::SchemaUnresolvedReference
            })
    }

    /// Build the `xs:simpleType` at `comp`. Named types are registered in the grammar.
    pub(super) fn simple_type(
        &mut self,
        comp: Component,
        name: Option<TypeName>,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        let default = self.doc(comp).final_default;
        let final_set = self.derivation_attribute(
            comp,
            "final",
            default,
            DerivationSet::RESTRICTION | DerivationSet::LIST | DerivationSet::UNION,
        )?;
        let children = self.children(comp);
        let [(child, kind)] = children.as_slice() else {
            return Err(self.fail(
                comp,
                XMLError::SchemaUnexpectedElement,
                "'xs:simpleType' needs exactly one of 'restriction', 'list' or 'union'",
            ));
        };
        let child = *child;
        let environment = self.resolver.environment().clone();
        let result = match kind.as_str() {
            "restriction" => {
                let (base, facets) = self.restriction(child)?;
                self.grammar.datatypes_mut().create_restriction(
                    &base,
                    name,
                    &facets,
                    final_set,
                    environment.categories(),
                )
            }
            "list" => {
                let item = self.nested_type(child, "itemType")?;
                self.grammar
                    .datatypes_mut()
                    .create_list(&item, name, final_set)
            }
            "union" => {
                let members = self.member_types(child)?;
                self.grammar
                    .datatypes_mut()
                    .create_union(members, name, final_set)
            }
            other => {
                return Err(self.fail(
                    child,
                    XMLError::SchemaUnexpectedElement,
                    format_args!("'{other}' cannot define a simple type"),
                ));
            }
        };
        result.map_err(|err| self.fail(comp, err, "the simple type cannot be derived"))
    }

    /// The type named by the attribute `attribute`, or else the anonymous
    /// `xs:simpleType` child of `comp`.
    fn nested_type(
        &mut self,
        comp: Component,
        attribute: &str,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        let inline = self
            .children(comp)
            .into_iter()
            .find(|(_, name)| name == "simpleType")
            .map(|(child, _)| child);
        match (self.attribute(comp, attribute), inline) {
            (Some(_), Some(_)) => Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                format_args!("'{attribute}' and an anonymous type cannot appear together"),
            )),
            (Some(qname), None) => {
                let name = self.resolve_qname(comp, &qname)?;
                self.simple_type_by_name(&name)
            }
            (None, Some(child)) => self.simple_type(child, None),
            (None, None) => Err(self.fail(
                comp,
                XMLError::SchemaMissingAttribute,
                format_args!("either '{attribute}' or an anonymous type is required"),
            )),
        }
    }

    /// Read the base type and the facets of an `xs:restriction` of a simple type.
    pub(super) fn restriction(
        &mut self,
        comp: Component,
    ) -> Result<(Arc<DatatypeValidator>, Vec<FacetValue>), XMLError> {
        let base = self.nested_type(comp, "base")?;
        let facets = self.facets(comp)?;
        Ok((base, facets))
    }

    pub(super) fn facets(&self, comp: Component) -> Result<Vec<FacetValue>, XMLError> {
        let mut facets = vec![];
        for (child, name) in self.children(comp) {
            let Some(kind) = FacetKind::from_name(&name) else {
                // anonymous base types, attributes and wildcards are read elsewhere
                continue;
            };
            let value = self.attribute(child, "value").ok_or_else(|| {
                self.fail(child, XMLError::SchemaMissingAttribute, "'value' is missing")
            })?;
            let mut facet = FacetValue::new(kind, value);
            facet.fixed = self.boolean_attribute(child, "fixed")?;
            facets.push(facet);
        }
        Ok(facets)
    }

    fn member_types(&mut self, comp: Component) -> Result<Vec<Arc<DatatypeValidator>>, XMLError> {
        let mut members = vec![];
        if let Some(member_types) = self.attribute(comp, "memberTypes") {
            for qname in StringTokenizer::new(&member_types) {
                let name = self.resolve_qname(comp, qname)?;
                members.push(self.simple_type_by_name(&name)?);
            }
        }
        for (child, name) in self.children(comp) {
            if name == "simpleType" {
                members.push(self.simple_type(child, None)?);
            }
        }
        if members.is_empty() {
            return Err(self.fail(
                comp,
                XMLError::SchemaMissingAttribute,
                "a union needs at least one member type",
            ));
        }
        Ok(members)
    }

    /// The types of the attributes in the `xml` namespace.
    pub(super) fn xml_attribute_type(&self, local_name: &str) -> Option<Arc<DatatypeValidator>> {
        let builtin = match local_name {
            "lang" => "language",
            "space" => "NCName",
            "base" => "anyURI",
            "id" => "ID",
            _ => return None,
        };
        log::trace!("use xs:{builtin} for the attribute '{{{XML_XML_NAMESPACE}}}{local_name}'");
        self.builtin(builtin)
    }
}
