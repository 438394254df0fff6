use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};

mod route53;
pub use route53::*;
mod acm;
pub use acm::*;
mod s3_bucket;
pub use s3_bucket::*;
mod cloudfront;
pub use cloudfront::*;
mod deployment;
pub use deployment::*;

/// CloudFront only accepts ACM certificates that live in this region.
pub const CLOUDFRONT_CERTIFICATE_REGION: &str = "us-east-1";

/// A resource that can be placed into a CloudFormation template.
pub trait CfnResource: fmt::Debug {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> serde_json::Result<Value>;
}

/// A CloudFormation logical id. Only ascii alphanumerics are allowed,
/// and it cannot be longer than 255 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() || s.len() > 255 {
            return Err(format!("Invalid logical id '{s}'. Must be between 1 and 255 characters"));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "Invalid logical id '{s}'. Must only contain alphanumeric characters"
            ));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What the provisioning engine should do with a resource when it is
/// removed from the stack or replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

impl RemovalPolicy {
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

impl std::str::FromStr for RemovalPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retain" => Ok(RemovalPolicy::Retain),
            "destroy" | "delete" => Ok(RemovalPolicy::Destroy),
            x => Err(format!("Unknown removal policy '{x}'. Expected 'retain' or 'destroy'")),
        }
    }
}

pub fn get_ref<S: AsRef<str>>(logical_id: S) -> Value {
    json!({ "Ref": logical_id.as_ref() })
}

pub fn get_att<S: AsRef<str>>(logical_id: S, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id.as_ref(), attribute] })
}

pub fn sub<S: AsRef<str>>(template: S) -> Value {
    json!({ "Fn::Sub": template.as_ref() })
}

/// collects every logical id that a properties value refers to via
/// Ref, Fn::GetAtt, or a ${Name} / ${Name.Attr} placeholder inside Fn::Sub.
/// pseudo parameters (AWS::Region, etc.) are skipped.
pub fn referenced_ids(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_references(value, &mut out);
    out
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(id)) = map.get("Ref") {
                    if !id.starts_with("AWS::") {
                        out.insert(id.clone());
                    }
                    return;
                }
                if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(id)) = parts.first() {
                        out.insert(id.clone());
                    }
                    return;
                }
                if let Some(Value::String(template)) = map.get("Fn::Sub") {
                    collect_sub_placeholders(template, out);
                    return;
                }
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

fn collect_sub_placeholders(template: &str, out: &mut BTreeSet<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(e) => e,
            None => return,
        };
        let name = &after[..end];
        // ${!Literal} is an escape, not a reference
        if !name.starts_with('!') && !name.starts_with("AWS::") {
            let id = name.split('.').next().unwrap_or(name);
            if !id.is_empty() {
                out.insert(id.to_string());
            }
        }
        rest = &after[end + 1..];
    }
}

/// a single IAM policy statement, serialized the way CloudFormation
/// expects it inside a PolicyDocument.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    pub action: Vec<String>,
    pub resource: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self { version: "2012-10-17".to_string(), statement }
    }
}
