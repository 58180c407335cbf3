use crate::registry::NodeRegistry;
use crate::template;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;
use wfcore::value::type_name;
use wfcore::{ValidationError, WorkflowIr};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Advisory findings: reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A declared output no node's interface says it writes
    UntraceableOutput { output: String },

    /// A param reference whose root is neither a declared input nor a key any
    /// node writes
    UntraceableReference { node_id: String, reference: String },

    /// A node no path from the entry node reaches
    UnreachableNode { node_id: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::UntraceableOutput { output } => write!(
                f,
                "Declared output '{}' is not written by any node's declared interface; it must be written dynamically",
                output
            ),
            ValidationWarning::UntraceableReference { node_id, reference } => write!(
                f,
                "Node '{}' references '{}', which is neither a declared input nor a declared node output",
                node_id, reference
            ),
            ValidationWarning::UnreachableNode { node_id } => {
                write!(f, "Node '{}' is not reachable from the entry node", node_id)
            }
        }
    }
}

/// Result of validating one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural and interface checks over a workflow document.
///
/// The validator never sees run-time arguments or settings, so it does not
/// decide whether required inputs will be supplied; the compiler does that
/// after precedence resolution.
pub struct Validator<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, doc: &WorkflowIr) -> ValidationReport {
        let mut report = ValidationReport::default();

        if doc.format_version.trim().is_empty() {
            report.errors.push(ValidationError::MissingFormatVersion);
        }

        let node_ids = self.check_nodes(doc, &mut report);
        self.check_edges(doc, &node_ids, &mut report);
        self.check_names(doc, &mut report);
        self.check_defaults(doc, &mut report);

        let writes = self.collect_writes(doc);
        self.check_outputs(doc, &writes, &mut report);
        self.check_references(doc, &writes, &mut report);

        if report.errors.is_empty() {
            self.check_reachability(doc, &mut report);
        }

        report
    }

    fn check_nodes<'d>(&self, doc: &'d WorkflowIr, report: &mut ValidationReport) -> HashSet<&'d str> {
        if doc.nodes.is_empty() {
            report.errors.push(ValidationError::NoNodes);
        }

        let mut seen = HashSet::new();
        for (index, node) in doc.nodes.iter().enumerate() {
            if node.id.is_empty() {
                report.errors.push(ValidationError::EmptyNodeId { index });
            } else if !seen.insert(node.id.as_str()) {
                report
                    .errors
                    .push(ValidationError::DuplicateNodeId(node.id.clone()));
            }

            if !self.registry.contains(&node.node_type) {
                report.errors.push(ValidationError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            }
        }

        if let Some(start) = &doc.start_node {
            if !seen.contains(start.as_str()) {
                report
                    .errors
                    .push(ValidationError::UnknownStartNode(start.clone()));
            }
        }

        seen
    }

    fn check_edges(&self, doc: &WorkflowIr, node_ids: &HashSet<&str>, report: &mut ValidationReport) {
        let mut routes = HashSet::new();
        for (index, edge) in doc.edges.iter().enumerate() {
            for (end, node_id) in [("source", &edge.from), ("target", &edge.to)] {
                if !node_ids.contains(node_id.as_str()) {
                    report.errors.push(ValidationError::DanglingEdge {
                        index,
                        end,
                        node_id: node_id.clone(),
                    });
                }
            }

            if !routes.insert((edge.from.as_str(), edge.action.as_str())) {
                report.errors.push(ValidationError::DuplicateAction {
                    from: edge.from.clone(),
                    action: edge.action.clone(),
                });
            }
        }
    }

    fn check_names(&self, doc: &WorkflowIr, report: &mut ValidationReport) {
        let inputs = doc.inputs.keys().map(|name| ("input", name));
        let outputs = doc.outputs.keys().map(|name| ("output", name));
        for (kind, name) in inputs.chain(outputs) {
            if !is_identifier(name) {
                report.errors.push(ValidationError::InvalidIdentifier {
                    kind,
                    name: name.clone(),
                });
            }
        }
    }

    fn check_defaults(&self, doc: &WorkflowIr, report: &mut ValidationReport) {
        for (name, input) in &doc.inputs {
            if let (Some(hint), Some(default)) = (input.type_hint, &input.default) {
                if !hint.matches(default) {
                    report.errors.push(ValidationError::DefaultTypeMismatch {
                        input: name.clone(),
                        expected: hint,
                        actual: type_name(default).to_string(),
                    });
                }
            }
        }
    }

    /// Union of every key the document's nodes declare they write. Nested
    /// workflow nodes contribute through their own interface, which covers
    /// their output mapping.
    fn collect_writes(&self, doc: &WorkflowIr) -> HashSet<String> {
        doc.nodes
            .iter()
            .filter_map(|node| self.registry.interface_for(&node.node_type, &node.params).ok())
            .flat_map(|interface| {
                interface
                    .writes()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn check_outputs(&self, doc: &WorkflowIr, writes: &HashSet<String>, report: &mut ValidationReport) {
        for name in doc.outputs.keys() {
            if !writes.contains(name) {
                report.warnings.push(ValidationWarning::UntraceableOutput {
                    output: name.clone(),
                });
            }
        }
    }

    fn check_references(&self, doc: &WorkflowIr, writes: &HashSet<String>, report: &mut ValidationReport) {
        for node in &doc.nodes {
            let verbatim: Vec<String> = self
                .registry
                .resolve(&node.node_type)
                .map(|f| f.verbatim_params().iter().map(|p| p.to_string()).collect())
                .unwrap_or_else(|_| Vec::new());

            let mut keys: Vec<&String> = node.params.keys().collect();
            keys.sort();
            for key in keys {
                if verbatim.contains(key) {
                    continue;
                }
                for reference in template::collect_references(&node.params[key]) {
                    let root = reference.root();
                    if !doc.inputs.contains_key(root) && !writes.contains(root) {
                        report.warnings.push(ValidationWarning::UntraceableReference {
                            node_id: node.id.clone(),
                            reference: reference.raw,
                        });
                    }
                }
            }
        }
    }

    fn check_reachability(&self, doc: &WorkflowIr, report: &mut ValidationReport) {
        let Some(entry) = doc.entry_node() else {
            return;
        };

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let index: HashMap<&str, NodeIndex> = doc
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), graph.add_node(n.id.as_str())))
            .collect();
        for edge in &doc.edges {
            if let (Some(from), Some(to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
                graph.add_edge(*from, *to, ());
            }
        }

        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&graph, index[entry.id.as_str()]);
        while let Some(idx) = dfs.next(&graph) {
            reached.insert(idx);
        }

        for node in &doc.nodes {
            if !reached.contains(&index[node.id.as_str()]) {
                report.warnings.push(ValidationWarning::UnreachableNode {
                    node_id: node.id.clone(),
                });
            }
        }
    }
}

/// Validate a document against a registry
pub fn validate(doc: &WorkflowIr, registry: &NodeRegistry) -> ValidationReport {
    Validator::new(registry).validate(doc)
}
