//! The resource graph: every declared node plus explicit dependency edges.
//!
//! Nodes can only depend on nodes that were added before them, so the
//! declaration order is always a valid deployment order. On top of that the
//! graph checks that every `Ref`, `Fn::GetAtt` or `Fn::Sub` placeholder
//! inside a resource's properties is backed by a declared edge, so an engine
//! that only looks at the edges orders things the same way as one that
//! tracks references.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::resources::{
    referenced_ids, BucketDeployment, CfnResource, HostedZoneLookup, LogicalId, RemovalPolicy,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("'{0}' is declared more than once")]
    Duplicate(String),

    #[error("'{node}' depends on '{dependency}', which has not been declared yet")]
    UnknownDependency { node: String, dependency: String },

    #[error("'{node}' refers to '{reference}' without declaring a dependency on it")]
    UndeclaredReference { node: String, reference: String },

    #[error("dependency cycle between: {0}")]
    Cycle(String),

    #[error("failed to render properties of '{node}': {message}")]
    Properties { node: String, message: String },
}

#[derive(Debug)]
pub enum NodeKind {
    /// something that ends up in a template.
    Resource(Box<dyn CfnResource>),
    /// resolved by name when the deployment runs, handed to templates as a parameter.
    ZoneLookup(HostedZoneLookup),
    /// runs after the stacks are deployed.
    Deployment(BucketDeployment),
}

impl NodeKind {
    pub fn type_string(&self) -> &'static str {
        match self {
            NodeKind::Resource(r) => r.type_string(),
            NodeKind::ZoneLookup(_) => "Action::HostedZoneLookup",
            NodeKind::Deployment(_) => "Action::BucketDeployment",
        }
    }
}

#[derive(Debug)]
pub struct Node {
    pub id: LogicalId,
    /// only template resources live in a region. Actions run from wherever
    /// the deployment is started.
    pub region: Option<String>,
    pub kind: NodeKind,
    pub depends_on: Vec<LogicalId>,
    pub removal_policy: Option<RemovalPolicy>,
}

impl Node {
    pub fn resource<R, S>(id: &LogicalId, region: S, resource: R) -> Self
    where
        R: CfnResource + 'static,
        S: Into<String>,
    {
        Self {
            id: id.clone(),
            region: Some(region.into()),
            kind: NodeKind::Resource(Box::new(resource)),
            depends_on: vec![],
            removal_policy: None,
        }
    }

    pub fn zone_lookup(id: &LogicalId, lookup: HostedZoneLookup) -> Self {
        Self {
            id: id.clone(),
            region: None,
            kind: NodeKind::ZoneLookup(lookup),
            depends_on: vec![],
            removal_policy: None,
        }
    }

    pub fn deployment(id: &LogicalId, deployment: BucketDeployment) -> Self {
        Self {
            id: id.clone(),
            region: None,
            kind: NodeKind::Deployment(deployment),
            depends_on: vec![],
            removal_policy: None,
        }
    }

    pub fn with_dependencies(mut self, deps: &[&LogicalId]) -> Self {
        for dep in deps {
            if !self.depends_on.contains(dep) {
                self.depends_on.push((*dep).clone());
            }
        }
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, NodeKind::Resource(_))
    }

    /// the ids this node actually uses, as opposed to the ones it declares.
    fn references(&self) -> Result<BTreeSet<String>, GraphError> {
        match &self.kind {
            NodeKind::Resource(r) => {
                let props = r.properties().map_err(|e| GraphError::Properties {
                    node: self.id.to_string(),
                    message: e.to_string(),
                })?;
                Ok(referenced_ids(&props))
            }
            NodeKind::ZoneLookup(_) => Ok(BTreeSet::new()),
            NodeKind::Deployment(d) => Ok([d.bucket.to_string(), d.distribution.to_string()]
                .into_iter()
                .collect()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: Vec<Node>,
    index: HashMap<LogicalId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> Result<LogicalId, GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::Duplicate(node.id.to_string()));
        }
        for dep in &node.depends_on {
            if !self.index.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    node: node.id.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
        for reference in node.references()? {
            if !node.depends_on.iter().any(|d| d.as_str() == reference) {
                return Err(GraphError::UndeclaredReference {
                    node: node.id.to_string(),
                    reference,
                });
            }
        }
        tracing::debug!(
            id = %node.id,
            kind = node.kind.type_string(),
            deps = node.depends_on.len(),
            "declared node"
        );
        let id = node.id.clone();
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    /// nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> &[LogicalId] {
        self.get(id).map(|n| n.depends_on.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> Vec<&LogicalId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.iter().any(|d| d.as_str() == id))
            .map(|n| &n.id)
            .collect()
    }

    /// Kahn's algorithm. When several nodes are ready at once, the one
    /// declared first goes first, so the order is stable across runs.
    pub fn topological_order(&self) -> Result<Vec<&Node>, GraphError> {
        let mut remaining_deps: Vec<usize> =
            self.nodes.iter().map(|n| n.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                match self.index.get(dep) {
                    Some(&d) => dependents[d].push(i),
                    None => {
                        return Err(GraphError::UnknownDependency {
                            node: node.id.to_string(),
                            dependency: dep.to_string(),
                        })
                    }
                }
            }
        }
        let mut ready: BTreeSet<usize> = remaining_deps
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| i)
            .collect();
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            out.push(&self.nodes[next]);
            for &dependent in &dependents[next] {
                remaining_deps[dependent] -= 1;
                if remaining_deps[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        if out.len() != self.nodes.len() {
            let stuck: Vec<&str> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| remaining_deps[*i] > 0)
                .map(|(_, n)| n.id.as_str())
                .collect();
            return Err(GraphError::Cycle(stuck.join(", ")));
        }
        Ok(out)
    }
}
