//! Splits a resource graph into CloudFormation stacks, one per region.
//!
//! A stack can only see its own resources. When a resource depends on
//! something outside its stack, the value travels as a template parameter:
//! - for another stack's resource, the producing stack outputs `Ref` of it and
//!   the deploy script feeds that output into the consuming stack.
//! - for a hosted zone lookup, the deploy script resolves the zone id by name.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{Result, SiteError};
use crate::graph::{Node, NodeKind, ResourceGraph};
use crate::resources::{
    get_ref, referenced_ids, HostedZoneLookup, LogicalId, HOSTED_ZONE_ID_PARAMETER_TYPE,
};
use crate::template::{ResourceOutput, SavedParameter, SavedResource, SavedTemplate};

/// A value exposed by the declaration for operators and other stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedOutput {
    pub key: String,
    pub description: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    ZoneLookup(HostedZoneLookup),
    StackOutput { stack: String, output_key: String },
}

/// a parameter of a stack, and where the deploy script gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInput {
    pub parameter: String,
    pub source: InputSource,
}

#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub region: String,
    pub template: SavedTemplate,
    pub inputs: Vec<StackInput>,
    pub depends_on: BTreeSet<String>,
}

impl Stack {
    fn new(name: String, region: String, description: &str) -> Self {
        let template = SavedTemplate {
            description: Some(description.to_string()),
            ..Default::default()
        };
        Self { name, region, template, inputs: vec![], depends_on: BTreeSet::new() }
    }

    pub fn file_name(&self) -> String {
        format!("{}.template.json", self.name)
    }
}

/// where a node's value can be read after deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub stack: String,
    pub output_key: String,
}

#[derive(Debug, Clone)]
pub struct StackLayout {
    pub base_name: String,
    pub primary_region: String,
    pub description: String,
}

impl StackLayout {
    pub fn stack_name_for(&self, region: &str) -> String {
        if region == self.primary_region {
            self.base_name.clone()
        } else {
            format!("{}-{}", self.base_name, region)
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackSet {
    /// in the order they must be deployed.
    pub stacks: Vec<Stack>,
    /// values that actions read from deployed stacks, by node id.
    pub exports: BTreeMap<LogicalId, Export>,
}

impl StackSet {
    pub fn build(
        graph: &ResourceGraph,
        layout: &StackLayout,
        outputs: &[NamedOutput],
    ) -> Result<Self> {
        let order = graph.topological_order()?;
        let mut builder = Builder { graph, layout, stacks: vec![], exports: BTreeMap::new() };
        builder.stack_index(&layout.primary_region);

        for node in &order {
            if let NodeKind::Resource(resource) = &node.kind {
                let region = node.region.as_deref().unwrap_or(&layout.primary_region);
                let stack = builder.stack_index(region);
                let properties = resource.properties().map_err(SiteError::Json)?;
                let mut depends_on = vec![];
                for dep in &node.depends_on {
                    if builder.wire(stack, dep, &properties)? {
                        depends_on.push(dep.to_string());
                    }
                }
                let policy = node.removal_policy.map(|p| p.as_cfn().to_string());
                builder.stacks[stack].template.resources.insert(node.id.to_string(), SavedResource {
                    ty: resource.type_string().to_string(),
                    properties,
                    depends_on,
                    deletion_policy: policy.clone(),
                    update_replace_policy: policy,
                });
            }
        }

        let primary = builder.stack_index(&layout.primary_region);
        for output in outputs {
            for reference in referenced_ids(&output.value) {
                let dep = LogicalId::new(reference.as_str()).map_err(SiteError::Config)?;
                if graph.get(dep.as_str()).is_none() {
                    return Err(SiteError::Config(format!(
                        "Output {} refers to unknown node {dep}",
                        output.key
                    )));
                }
                builder.wire(primary, &dep, &output.value)?;
            }
            builder.stacks[primary].template.outputs.insert(output.key.clone(), ResourceOutput {
                description: output.description.clone(),
                value: output.value.clone(),
            });
        }

        for node in &order {
            if let NodeKind::Deployment(deployment) = &node.kind {
                for dep in [&deployment.bucket, &deployment.distribution] {
                    let export = builder.export(dep)?;
                    builder.exports.insert(dep.clone(), export);
                }
            }
        }

        let stacks = order_stacks(builder.stacks)?;
        Ok(StackSet { stacks, exports: builder.exports })
    }

    pub fn get(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }
}

struct Builder<'a> {
    graph: &'a ResourceGraph,
    layout: &'a StackLayout,
    stacks: Vec<Stack>,
    exports: BTreeMap<LogicalId, Export>,
}

impl<'a> Builder<'a> {
    fn stack_index(&mut self, region: &str) -> usize {
        let name = self.layout.stack_name_for(region);
        if let Some(i) = self.stacks.iter().position(|s| s.name == name) {
            return i;
        }
        self.stacks.push(Stack::new(name, region.to_string(), &self.layout.description));
        self.stacks.len() - 1
    }

    fn node(&self, id: &LogicalId) -> Result<&'a Node> {
        self.graph
            .get(id.as_str())
            .ok_or_else(|| SiteError::Config(format!("Unknown node {id}")))
    }

    /// makes `dep` visible inside stack `stack`. Returns true when the
    /// dependency lives in the same stack and should be a DependsOn entry.
    fn wire(&mut self, stack: usize, dep: &LogicalId, uses: &Value) -> Result<bool> {
        let layout = self.layout;
        let dep_node = self.node(dep)?;
        match &dep_node.kind {
            NodeKind::Resource(_) => {
                let region = dep_node.region.as_deref().unwrap_or(&layout.primary_region);
                let owner = self.stack_index(region);
                if owner == stack {
                    return Ok(true);
                }
                if uses_get_att(uses, dep.as_str()) {
                    return Err(SiteError::Config(format!(
                        "{dep} lives in stack {} but is used with Fn::GetAtt from stack {}. Only Ref values can cross stacks",
                        self.stacks[owner].name, self.stacks[stack].name
                    )));
                }
                let export = self.export(dep)?;
                let owner_name = self.stacks[owner].name.clone();
                let consumer = &mut self.stacks[stack];
                consumer.depends_on.insert(owner_name);
                add_input(consumer, dep, "String", InputSource::StackOutput {
                    stack: export.stack,
                    output_key: export.output_key,
                });
                Ok(false)
            }
            NodeKind::ZoneLookup(lookup) => {
                add_input(
                    &mut self.stacks[stack],
                    dep,
                    HOSTED_ZONE_ID_PARAMETER_TYPE,
                    InputSource::ZoneLookup(lookup.clone()),
                );
                Ok(false)
            }
            NodeKind::Deployment(_) => Err(SiteError::Config(format!(
                "Nothing can depend on the deployment {dep}, it runs after every stack"
            ))),
        }
    }

    /// outputs Ref of a resource from the stack that owns it.
    fn export(&mut self, id: &LogicalId) -> Result<Export> {
        let layout = self.layout;
        let node = self.node(id)?;
        if !node.is_resource() {
            return Err(SiteError::Config(format!(
                "{id} is not a stack resource and cannot be exported"
            )));
        }
        let region = node.region.as_deref().unwrap_or(&layout.primary_region);
        let owner = self.stack_index(region);
        let output_key = format!("{id}Ref");
        let stack = &mut self.stacks[owner];
        stack.template.outputs.entry(output_key.clone()).or_insert_with(|| ResourceOutput {
            description: format!("Ref of {id}"),
            value: get_ref(id),
        });
        Ok(Export { stack: stack.name.clone(), output_key })
    }
}

fn add_input(stack: &mut Stack, id: &LogicalId, ty: &str, source: InputSource) {
    let parameter = id.to_string();
    if stack.template.parameters.contains_key(&parameter) {
        return;
    }
    let description = match &source {
        InputSource::ZoneLookup(lookup) => format!("id of the hosted zone {}", lookup.zone_name()),
        InputSource::StackOutput { stack, output_key } => {
            format!("{output_key} from stack {stack}")
        }
    };
    stack.template.parameters.insert(parameter.clone(), SavedParameter {
        ty: ty.to_string(),
        description: Some(description),
    });
    stack.inputs.push(StackInput { parameter, source });
}

fn uses_get_att(value: &Value, id: &str) -> bool {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if parts.first().and_then(|p| p.as_str()) == Some(id) {
                    return true;
                }
            }
            if let Some(Value::String(template)) = map.get("Fn::Sub") {
                if template.contains(&format!("${{{id}.")) {
                    return true;
                }
            }
            map.values().any(|v| uses_get_att(v, id))
        }
        Value::Array(items) => items.iter().any(|v| uses_get_att(v, id)),
        _ => false,
    }
}

/// orders stacks so every stack comes after the stacks it reads outputs from.
/// ties keep the order the stacks were first seen in.
fn order_stacks(mut stacks: Vec<Stack>) -> Result<Vec<Stack>> {
    let mut out: Vec<Stack> = Vec::with_capacity(stacks.len());
    while !stacks.is_empty() {
        let ready = stacks
            .iter()
            .position(|s| s.depends_on.iter().all(|d| out.iter().any(|o| &o.name == d)));
        match ready {
            Some(i) => out.push(stacks.remove(i)),
            None => {
                let names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
                return Err(SiteError::Config(format!(
                    "Stacks depend on each other: {}",
                    names.join(", ")
                )));
            }
        }
    }
    Ok(out)
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> std::result::Result<String, String> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("Invalid stack name {stack_name}\n{restriction}")),
    }
    if stack_name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '-') {
        return Err(format!("Invalid stack name {stack_name}\n{restriction}"));
    }
    if stack_name.len() > 128 {
        return Err(format!("Invalid stack name {stack_name}\n{restriction}"));
    }
    Ok(stack_name.to_string())
}

/// "cdn.example.com" -> "cdn-example-com"
pub fn derive_stack_name(site_domain: &str) -> String {
    let mut name: String = site_domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(128);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::resources::{get_att, json, CfnResource, HostedZoneLookup};

    #[derive(Debug)]
    struct Dummy(Value);

    impl CfnResource for Dummy {
        fn type_string(&self) -> &'static str {
            "Test::Dummy"
        }
        fn properties(&self) -> serde_json::Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn layout(region: &str) -> StackLayout {
        StackLayout {
            base_name: "site".into(),
            primary_region: region.into(),
            description: "test".into(),
        }
    }

    fn graph(dist_region: &str) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.add(Node::zone_lookup(&id("Zone"), HostedZoneLookup::new("example.com"))).unwrap();
        graph
            .add(
                Node::resource(&id("Cert"), "us-east-1", Dummy(json!({ "Zone": get_ref("Zone") })))
                    .with_dependencies(&[&id("Zone")]),
            )
            .unwrap();
        graph
            .add(
                Node::resource(&id("Dist"), dist_region, Dummy(json!({ "Cert": get_ref("Cert") })))
                    .with_dependencies(&[&id("Cert")]),
            )
            .unwrap();
        graph
    }

    #[test]
    fn cross_region_refs_become_parameters() {
        let set = StackSet::build(&graph("eu-west-1"), &layout("eu-west-1"), &[]).unwrap();
        let names: Vec<&str> = set.stacks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["site-us-east-1", "site"]);

        let cert_stack = set.get("site-us-east-1").unwrap();
        assert_eq!(cert_stack.region, "us-east-1");
        assert_eq!(cert_stack.template.outputs["CertRef"].value, get_ref("Cert"));
        assert_eq!(cert_stack.template.parameters["Zone"].ty, HOSTED_ZONE_ID_PARAMETER_TYPE);

        let site = set.get("site").unwrap();
        assert_eq!(site.template.parameters["Cert"].ty, "String");
        assert!(site.template.resources["Dist"].depends_on.is_empty());
        assert_eq!(site.inputs, vec![StackInput {
            parameter: "Cert".into(),
            source: InputSource::StackOutput {
                stack: "site-us-east-1".into(),
                output_key: "CertRef".into(),
            },
        }]);
    }

    #[test]
    fn same_region_refs_become_depends_on() {
        let set = StackSet::build(&graph("us-east-1"), &layout("us-east-1"), &[]).unwrap();
        assert_eq!(set.stacks.len(), 1);
        let site = &set.stacks[0];
        assert_eq!(site.template.resources["Dist"].depends_on, vec!["Cert".to_string()]);
        assert!(!site.template.parameters.contains_key("Cert"));
        assert!(site.template.parameters.contains_key("Zone"));
    }

    #[test]
    fn get_att_cannot_cross_stacks() {
        let mut graph = ResourceGraph::new();
        graph.add(Node::resource(&id("A"), "us-east-1", Dummy(json!({})))).unwrap();
        graph
            .add(
                Node::resource(&id("B"), "eu-west-1", Dummy(json!({ "X": get_att("A", "Arn") })))
                    .with_dependencies(&[&id("A")]),
            )
            .unwrap();
        let err = StackSet::build(&graph, &layout("eu-west-1"), &[]).unwrap_err();
        assert!(err.to_string().contains("Only Ref values can cross stacks"));
    }

    #[test]
    fn stack_names_follow_cloudformation_rules() {
        assert_eq!(derive_stack_name("cdn.example.com"), "cdn-example-com");
        assert!(validate_stack_name("cdn-example-com").is_ok());
        assert!(validate_stack_name("1cdn").is_err());
        assert!(validate_stack_name("cdn_site").is_err());
        assert!(validate_stack_name(&"a".repeat(129)).is_err());
        assert!(validate_stack_name("").is_err());
    }
}
