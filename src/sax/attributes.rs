use std::{ops::Index, sync::Arc};

use crate::{FastHashMap, error::XMLError};

#[derive(Debug, Clone)]
pub struct Attribute {
    pub uri: Option<Arc<str>>,
    pub local_name: Option<Arc<str>>,
    pub qname: Arc<str>,
    pub value: Box<str>,
    // 0: is declared in DTD or schema
    // 1: is specified explicitly (in other words, `value` is not a default value)
    // 2: is namespace declaration attribute
    pub(crate) flag: u8,
}

impl Attribute {
    pub(crate) fn new(qname: impl Into<Arc<str>>, value: impl Into<Box<str>>) -> Self {
        Self {
            uri: None,
            local_name: None,
            qname: qname.into(),
            value: value.into(),
            flag: 0,
        }
    }

    pub(crate) fn set_declared(&mut self) {
        self.flag |= 1 << 0;
    }
    pub(crate) fn set_specified(&mut self) {
        self.flag |= 1 << 1;
    }
    pub(crate) fn set_nsdecl(&mut self) {
        self.flag |= 1 << 2;
    }

    /// Check if this attribute is declared in the grammar.
    pub fn is_declared(&self) -> bool {
        self.flag & (1 << 0) != 0
    }
    /// Check if this attribute is specified explicitly.
    ///
    /// In other words, check if this attribute does not originate from a default value.
    pub fn is_specified(&self) -> bool {
        self.flag & (1 << 1) != 0
    }
    /// Check if this attribute is a namespace declaration attribute.
    pub fn is_nsdecl(&self) -> bool {
        self.flag & (1 << 2) != 0
    }
}

/// A list of attributes.
///
/// This list may contain namespace declarations.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    attributes: Vec<Attribute>,
    index_by_qname: FastHashMap<Arc<str>, usize>,
    // key      : (namespace name, local name)
    index_by_expanded_name: FastHashMap<(Arc<str>, Arc<str>), usize>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the index of an attribute whose QName is `qname`.
    pub fn get_index_by_qname(&self, qname: &str) -> Option<usize> {
        self.index_by_qname.get(qname).copied()
    }

    /// Get the index of an attribute whose extended name is `{namespace_name}local_name`.
    pub fn get_index_by_expanded_name(
        &self,
        namespace_name: Option<&str>,
        local_name: &str,
    ) -> Option<usize> {
        let key: (Arc<str>, Arc<str>) = (namespace_name.unwrap_or("").into(), local_name.into());
        self.index_by_expanded_name.get(&key).copied()
    }

    /// The number of attributes contained in this list.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if this list has no attributes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if this list has an attribute whose QName is `qname`.
    pub fn contains_qname(&self, qname: &str) -> bool {
        self.get_index_by_qname(qname).is_some()
    }

    /// Check if this list has an attribute whose extended name is `{namespace_name}local_name`.
    pub fn contains_expanded_name(&self, namespace_name: Option<&str>, local_name: &str) -> bool {
        self.get_index_by_expanded_name(namespace_name, local_name)
            .is_some()
    }

    /// Get the local name of `index`-th attribute in this list.
    pub fn get_local_name(&self, index: usize) -> Option<&str> {
        self.attributes.get(index)?.local_name.as_deref()
    }

    /// Get the QName of `index`-th attribute in this list.
    pub fn get_qname(&self, index: usize) -> Option<&str> {
        Some(self.attributes.get(index)?.qname.as_ref())
    }

    /// Get the namespace name of `index`-th attribute in this list.
    pub fn get_namespace_uri(&self, index: usize) -> Option<&str> {
        self.attributes.get(index)?.uri.as_deref()
    }

    /// Get the value of `index`-th attribute in this list.
    pub fn get_value(&self, index: usize) -> Option<&str> {
        Some(self.attributes.get(index)?.value.as_ref())
    }

    /// Get the value of an attribute whose QName is `qname`.
    pub fn get_value_by_qname(&self, qname: &str) -> Option<&str> {
        let index = self.get_index_by_qname(qname)?;
        self.get_value(index)
    }

    /// Get the value of an attribute whose extended name is `{namespace_name}local_name`.
    pub fn get_value_by_expanded_name(
        &self,
        namespace_name: Option<&str>,
        local_name: &str,
    ) -> Option<&str> {
        let index = self.get_index_by_expanded_name(namespace_name, local_name)?;
        self.get_value(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Attribute> {
        self.attributes.iter_mut()
    }

    pub(crate) fn set_value(&mut self, index: usize, value: impl Into<Box<str>>) {
        if let Some(att) = self.attributes.get_mut(index) {
            att.value = value.into();
        }
    }

    /// Add `attribute` indexed by its QName.
    ///
    /// If the attribute already has a local name, it is also indexed by its expanded name.
    pub(crate) fn push(&mut self, attribute: Attribute) -> Result<usize, (Attribute, XMLError)> {
        if self.index_by_qname.contains_key(&attribute.qname) {
            return Err((attribute, XMLError::ParserDuplicateAttributes));
        }
        let index = self.attributes.len();
        if let Some(local_name) = attribute.local_name.clone() {
            let key = (attribute.uri.clone().unwrap_or_else(|| "".into()), local_name);
            if self.index_by_expanded_name.contains_key(&key) {
                return Err((attribute, XMLError::ParserDuplicateAttributes));
            }
            self.index_by_expanded_name.insert(key, index);
        }
        self.index_by_qname.insert(attribute.qname.clone(), index);
        self.attributes.push(attribute);
        Ok(index)
    }

    /// Set the expanded name of `index`-th attribute after namespace processing.
    ///
    /// # Errors
    /// [`XMLError::ParserDuplicateAttributes`] if another attribute has the same
    /// expanded name. The name is set anyway, but not indexed.
    pub(crate) fn set_expanded_name(
        &mut self,
        index: usize,
        uri: Option<Arc<str>>,
        local_name: Arc<str>,
    ) -> Result<(), XMLError> {
        let Some(att) = self.attributes.get_mut(index) else {
            return Err(XMLError::InternalError);
        };
        att.uri = uri.clone();
        att.local_name = Some(local_name.clone());
        let key = (uri.unwrap_or_else(|| "".into()), local_name);
        if self.index_by_expanded_name.contains_key(&key) {
            return Err(XMLError::ParserDuplicateAttributes);
        }
        self.index_by_expanded_name.insert(key, index);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.attributes.clear();
        self.index_by_qname.clear();
        self.index_by_expanded_name.clear();
    }
}

impl Index<usize> for Attributes {
    type Output = Attribute;

    fn index(&self, index: usize) -> &Self::Output {
        &self.attributes[index]
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type IntoIter = std::slice::Iter<'a, Attribute>;
    type Item = &'a Attribute;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_attribute_tests() {
        let mut atts = Attributes::new();
        atts.push(Attribute::new("a:x", "1")).unwrap();
        atts.push(Attribute::new("b:x", "2")).unwrap();
        assert!(atts.push(Attribute::new("a:x", "3")).is_err());

        atts.set_expanded_name(0, Some("urn:a".into()), "x".into())
            .unwrap();
        // `a` and `b` are bound to the same namespace
        assert!(matches!(
            atts.set_expanded_name(1, Some("urn:a".into()), "x".into()),
            Err(XMLError::ParserDuplicateAttributes)
        ));
        assert_eq!(atts.get_value_by_expanded_name(Some("urn:a"), "x"), Some("1"));
        assert_eq!(atts.get_value_by_qname("b:x"), Some("2"));
        assert_eq!(atts.len(), 2);
    }
}
