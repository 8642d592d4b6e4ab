use std::sync::Arc;

use crate::{
    FastHashMap, FastHashSet,
    datatype::DatatypeValidator,
    error::XMLError,
    identity::{IdentityConstraint, IdentityConstraintKind},
    validation::content_model::ElementName,
};

/// An attribute of a started element, as seen by field matchers.
#[derive(Debug, Clone, Copy)]
pub struct FieldInput<'a> {
    pub name: &'a ElementName,
    pub value: &'a str,
    /// The simple type of the attribute, if it was validated.
    pub datatype: Option<&'a DatatypeValidator>,
}

/// An identity constraint is violated.
#[derive(Debug, Clone)]
pub struct IdentityViolation {
    pub error: XMLError,
    pub constraint: ElementName,
    pub message: String,
}

type KeyTuple = Box<[Box<str>]>;

fn key_value(value: &str, datatype: Option<&DatatypeValidator>) -> Box<str> {
    match datatype.map(|datatype| datatype.canonical(value)) {
        Some(Ok(canonical)) => canonical.into(),
        _ => value.into(),
    }
}

fn describe(tuple: &[Box<str>]) -> String {
    tuple
        .iter()
        .map(|value| format!("'{value}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

// An element field whose text is being collected.
#[derive(Debug)]
struct Capture {
    field: usize,
    depth: usize,
    text: String,
}

// A node selected by the selector of a constraint.
#[derive(Debug)]
struct Instance {
    depth: usize,
    values: Vec<Option<Box<str>>>,
    captures: Vec<Capture>,
}

impl Instance {
    fn set_field(
        &mut self,
        field: usize,
        value: Box<str>,
        constraint: &IdentityConstraint,
    ) -> Option<IdentityViolation> {
        if self.values[field].is_some() {
            return Some(IdentityViolation {
                error: XMLError::IdentityConstraintFieldMultipleMatch,
                constraint: constraint.name.clone(),
                message: format!(
                    "the field '{}' of {} '{}' matches more than one node",
                    constraint.fields[field], constraint.kind, constraint.name
                ),
            });
        }
        self.values[field] = Some(value);
        None
    }
}

// A constraint declared on an open element.
#[derive(Debug)]
struct ActiveScope {
    depth: usize,
    constraint: Arc<IdentityConstraint>,
    instances: Vec<Instance>,
    rows: Vec<KeyTuple>,
    incomplete: usize,
}

#[derive(Debug, Default)]
struct ElementFrame {
    // key and unique tables of this element and its descendants
    tables: FastHashMap<ElementName, FastHashSet<KeyTuple>>,
    // keyref rows waiting for a key declared on this element
    deferred: Vec<(Arc<IdentityConstraint>, Vec<KeyTuple>)>,
    declares: Vec<ElementName>,
}

/// Evaluates identity constraints over a stream of element events.
///
/// Every element declaring constraints opens a scope. Selected nodes collect their
/// field values while they are open; when the scope element ends, duplicate and
/// incomplete keys are reported, the key table is promoted to the enclosing elements
/// and the keyrefs of the scope are checked. A keyref whose key is declared on an
/// enclosing element is checked when that element ends.
#[derive(Debug, Default)]
pub struct IdentityConstraintHandler {
    path: Vec<ElementName>,
    frames: Vec<ElementFrame>,
    scopes: Vec<ActiveScope>,
}

impl IdentityConstraintHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of open elements.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Check if no constraint is being evaluated.
    pub fn is_idle(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn reset(&mut self) {
        self.path.clear();
        self.frames.clear();
        self.scopes.clear();
    }

    /// Notify the start of an element that declares `constraints`.
    pub fn start_element(
        &mut self,
        name: &ElementName,
        attributes: &[FieldInput<'_>],
        constraints: &[Arc<IdentityConstraint>],
    ) -> Vec<IdentityViolation> {
        self.path.push(name.clone());
        let depth = self.path.len();
        let mut frame = ElementFrame::default();
        for constraint in constraints {
            log::trace!("open the scope of {} '{}'", constraint.kind, constraint.name);
            frame.declares.push(constraint.name.clone());
            self.scopes.push(ActiveScope {
                depth,
                constraint: constraint.clone(),
                instances: vec![],
                rows: vec![],
                incomplete: 0,
            });
        }
        self.frames.push(frame);

        let mut violations = vec![];
        for scope in &mut self.scopes {
            let constraint = &scope.constraint;
            if constraint.selector.selects(&self.path[scope.depth..]) {
                scope.instances.push(Instance {
                    depth,
                    values: vec![None; constraint.fields.len()],
                    captures: vec![],
                });
            }

            for instance in &mut scope.instances {
                let relative = &self.path[instance.depth..];
                for (i, field) in constraint.fields.iter().enumerate() {
                    for path in field.paths() {
                        if !path.matches_element(relative) {
                            continue;
                        }
                        let Some(test) = path.attribute.as_ref() else {
                            instance.captures.push(Capture {
                                field: i,
                                depth,
                                text: String::new(),
                            });
                            continue;
                        };
                        for att in attributes.iter().filter(|att| test.matches(att.name)) {
                            let value = key_value(att.value, att.datatype);
                            violations.extend(instance.set_field(i, value, constraint));
                        }
                    }
                }
            }
        }
        violations
    }

    /// Notify character data in the current element.
    pub fn characters(&mut self, text: &str) {
        let depth = self.path.len();
        for scope in &mut self.scopes {
            for instance in &mut scope.instances {
                for capture in &mut instance.captures {
                    if capture.depth == depth {
                        capture.text.push_str(text);
                    }
                }
            }
        }
    }

    /// Notify the end of the current element.
    ///
    /// `datatype` is the simple type of the element content, if any.
    pub fn end_element(&mut self, datatype: Option<&DatatypeValidator>) -> Vec<IdentityViolation> {
        let depth = self.path.len();
        if depth == 0 {
            return vec![];
        }

        let mut violations = vec![];
        for scope in &mut self.scopes {
            let constraint = &scope.constraint;
            for instance in &mut scope.instances {
                let captures = std::mem::take(&mut instance.captures);
                for capture in captures {
                    if capture.depth != depth {
                        instance.captures.push(capture);
                        continue;
                    }
                    let value = key_value(&capture.text, datatype);
                    violations.extend(instance.set_field(capture.field, value, constraint));
                }
            }

            if let Some(pos) = scope.instances.iter().position(|inst| inst.depth == depth) {
                let instance = scope.instances.remove(pos);
                if let Some(values) = instance.values.into_iter().collect::<Option<Vec<_>>>() {
                    scope.rows.push(values.into_boxed_slice());
                } else {
                    scope.incomplete += 1;
                }
            }
        }

        let mut closing = vec![];
        while self.scopes.last().is_some_and(|scope| scope.depth == depth) {
            closing.extend(self.scopes.pop());
        }
        closing.reverse();
        let mut frame = self.frames.pop().unwrap_or_default();

        for scope in closing.iter().filter(|scope| !scope.constraint.is_keyref()) {
            let constraint = &scope.constraint;
            log::trace!("close the scope of {} '{}'", constraint.kind, constraint.name);
            if constraint.kind == IdentityConstraintKind::Key && scope.incomplete > 0 {
                violations.push(IdentityViolation {
                    error: XMLError::IdentityConstraintIncompleteKey,
                    constraint: constraint.name.clone(),
                    message: format!(
                        "{} node(s) selected by key '{}' do not have all fields",
                        scope.incomplete, constraint.name
                    ),
                });
            }
            let table = frame.tables.entry(constraint.name.clone()).or_default();
            let mut seen = FastHashSet::default();
            for row in &scope.rows {
                if !seen.insert(row) {
                    violations.push(IdentityViolation {
                        error: XMLError::IdentityConstraintDuplicateKey,
                        constraint: constraint.name.clone(),
                        message: format!(
                            "duplicate key value [{}] for {} '{}'",
                            describe(row),
                            constraint.kind,
                            constraint.name
                        ),
                    });
                }
                table.insert(row.clone());
            }
        }

        for scope in closing {
            let IdentityConstraintKind::KeyRef { refer } = &scope.constraint.kind else {
                continue;
            };
            if frame.tables.contains_key(refer) || frame.declares.contains(refer) {
                check_keyref(&frame, &scope.constraint, &scope.rows, &mut violations);
            } else if let Some(ancestor) = self
                .frames
                .iter_mut()
                .rev()
                .find(|ancestor| ancestor.declares.contains(refer))
            {
                log::trace!(
                    "keyref '{}' is checked when the scope of '{refer}' closes",
                    scope.constraint.name
                );
                ancestor.deferred.push((scope.constraint, scope.rows));
            } else {
                check_keyref(&frame, &scope.constraint, &scope.rows, &mut violations);
            }
        }

        for (constraint, rows) in std::mem::take(&mut frame.deferred) {
            check_keyref(&frame, &constraint, &rows, &mut violations);
        }

        if let Some(parent) = self.frames.last_mut() {
            for (name, table) in frame.tables {
                parent.tables.entry(name).or_default().extend(table);
            }
        }
        self.path.pop();
        violations
    }
}

fn check_keyref(
    frame: &ElementFrame,
    constraint: &IdentityConstraint,
    rows: &[KeyTuple],
    violations: &mut Vec<IdentityViolation>,
) {
    let IdentityConstraintKind::KeyRef { refer } = &constraint.kind else {
        return;
    };
    let table = frame.tables.get(refer);
    for row in rows {
        if table.is_none_or(|table| !table.contains(row)) {
            violations.push(IdentityViolation {
                error: XMLError::IdentityConstraintUnresolvedKeyRef,
                constraint: constraint.name.clone(),
                message: format!(
                    "keyref '{}' refers to [{}], but no such value exists for '{refer}'",
                    constraint.name,
                    describe(row)
                ),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatype::BuiltinTypes, identity::XPath};

    fn name(local: &str) -> ElementName {
        ElementName::new(None, local)
    }

    fn constraint(kind: IdentityConstraintKind, id: &str, selector: &str, field: &str) -> Arc<IdentityConstraint> {
        Arc::new(IdentityConstraint::new(
            kind,
            name(id),
            XPath::parse_selector(selector, &|_| None).unwrap(),
            vec![XPath::parse_field(field, &|_| None).unwrap()],
        ))
    }

    // (element, attribute name, attribute value)
    fn run(
        handler: &mut IdentityConstraintHandler,
        root: &[Arc<IdentityConstraint>],
        children: &[(&str, &str, &str)],
    ) -> Vec<IdentityViolation> {
        let mut violations = handler.start_element(&name("root"), &[], root);
        for &(element, att, value) in children {
            let att_name = name(att);
            let input = FieldInput {
                name: &att_name,
                value,
                datatype: None,
            };
            violations.extend(handler.start_element(&name(element), &[input], &[]));
            violations.extend(handler.end_element(None));
        }
        violations.extend(handler.end_element(None));
        violations
    }

    #[test]
    fn unique_tests() {
        let unique = constraint(IdentityConstraintKind::Unique, "u", "item", "@id");
        let mut handler = IdentityConstraintHandler::new();
        let violations = run(
            &mut handler,
            &[unique.clone()],
            &[("item", "id", "1"), ("item", "id", "1")],
        );
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].error,
            XMLError::IdentityConstraintDuplicateKey
        ));

        let violations = run(
            &mut handler,
            &[unique],
            &[("item", "id", "1"), ("item", "id", "2")],
        );
        assert!(violations.is_empty());
        assert!(handler.is_idle());
    }

    #[test]
    fn keyref_tests() {
        let key = constraint(IdentityConstraintKind::Key, "k", "def", "@k");
        let keyref = constraint(
            IdentityConstraintKind::KeyRef { refer: name("k") },
            "r",
            "ref",
            "@rk",
        );
        let mut handler = IdentityConstraintHandler::new();
        let constraints = [key, keyref];
        let violations = run(
            &mut handler,
            &constraints,
            &[("def", "k", "x"), ("ref", "rk", "x")],
        );
        assert!(violations.is_empty());

        let violations = run(
            &mut handler,
            &constraints,
            &[("def", "k", "x"), ("ref", "rk", "y")],
        );
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].error,
            XMLError::IdentityConstraintUnresolvedKeyRef
        ));
    }

    #[test]
    fn incomplete_key_tests() {
        let key = constraint(IdentityConstraintKind::Key, "k", "def", "@k");
        let mut handler = IdentityConstraintHandler::new();
        let violations = run(&mut handler, &[key], &[("def", "other", "x")]);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].error,
            XMLError::IdentityConstraintIncompleteKey
        ));
    }

    #[test]
    fn typed_element_field_tests() {
        // <root><n>01</n><n>1</n></root> with a unique constraint on the xs:int content
        let builtins = BuiltinTypes::new();
        let int = builtins.get("int").unwrap();
        let unique = constraint(IdentityConstraintKind::Unique, "u", "n", ".");
        let mut handler = IdentityConstraintHandler::new();
        let mut violations = handler.start_element(&name("root"), &[], &[unique]);
        for text in ["01", "1"] {
            violations.extend(handler.start_element(&name("n"), &[], &[]));
            handler.characters(text);
            violations.extend(handler.end_element(Some(int.as_ref())));
        }
        violations.extend(handler.end_element(None));
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].error,
            XMLError::IdentityConstraintDuplicateKey
        ));
    }

    #[test]
    fn keyref_to_enclosing_key_tests() {
        // <root><group><ref rk="x"/></group><def k="x"/></root>
        let key = constraint(IdentityConstraintKind::Key, "k", ".//def", "@k");
        let keyref = constraint(
            IdentityConstraintKind::KeyRef { refer: name("k") },
            "r",
            "ref",
            "@rk",
        );
        let mut handler = IdentityConstraintHandler::new();
        let mut violations = handler.start_element(&name("root"), &[], &[key]);
        violations.extend(handler.start_element(&name("group"), &[], &[keyref]));
        let rk = name("rk");
        let input = FieldInput {
            name: &rk,
            value: "x",
            datatype: None,
        };
        violations.extend(handler.start_element(&name("ref"), &[input], &[]));
        violations.extend(handler.end_element(None));
        violations.extend(handler.end_element(None));
        assert!(violations.is_empty());
        let k = name("k");
        let input = FieldInput {
            name: &k,
            value: "x",
            datatype: None,
        };
        violations.extend(handler.start_element(&name("def"), &[input], &[]));
        violations.extend(handler.end_element(None));
        violations.extend(handler.end_element(None));
        assert!(violations.is_empty(), "{violations:?}");
    }
}
