use super::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

/// A private bucket. Public access is always fully blocked; the only
/// way in is the bucket policy attached next to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    pub bucket_name: String,
    pub public_access_block_configuration: PublicAccessBlockConfiguration,
}

impl Bucket {
    pub fn private<S: Into<String>>(bucket_name: S) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            public_access_block_configuration: PublicAccessBlockConfiguration::block_all(),
        }
    }
}

impl CfnResource for Bucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub bucket: Value,
    pub policy_document: PolicyDocument,
}

impl BucketPolicy {
    /// grants s3:GetObject on every object in the bucket to the
    /// canonical user of the given origin access identity, and nobody else.
    pub fn origin_access_read(bucket: &LogicalId, oai: &LogicalId) -> Self {
        let statement = PolicyStatement {
            effect: "Allow".to_string(),
            action: vec!["s3:GetObject".to_string()],
            resource: vec![sub(format!("arn:${{AWS::Partition}}:s3:::${{{bucket}}}/*"))],
            principal: Some(json!({ "CanonicalUser": get_att(oai, "S3CanonicalUserId") })),
        };
        Self {
            bucket: get_ref(bucket),
            policy_document: PolicyDocument::new(vec![statement]),
        }
    }
}

impl CfnResource for BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

// s3 buckets in cloudformation cannot be deleted if they contain objects.
// when auto delete is turned on, a custom resource backed by a small lambda
// empties the bucket right before the stack deletes it.
const CLEANUP_HANDLER: &str = r#"import boto3
import cfnresponse

def handler(event, context):
    status = cfnresponse.SUCCESS
    if event['RequestType'] == 'Delete':
        try:
            bucket = boto3.resource('s3').Bucket(event['ResourceProperties']['BucketName'])
            bucket.objects.all().delete()
        except Exception as e:
            print(f'Error deleting objects from S3 bucket: {e}')
            status = cfnresponse.FAILED
    cfnresponse.send(event, context, status, {})
"#;

#[derive(Debug, Clone)]
pub struct CleanupRole {
    pub bucket: LogicalId,
}

impl CfnResource for CleanupRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        let bucket = &self.bucket;
        let assume = PolicyDocument::new(vec![PolicyStatement {
            effect: "Allow".to_string(),
            action: vec!["sts:AssumeRole".to_string()],
            resource: vec![],
            principal: Some(json!({ "Service": "lambda.amazonaws.com" })),
        }]);
        let mut assume = serde_json::to_value(assume)?;
        // trust policies don't take a Resource element
        if let Some(statement) = assume["Statement"][0].as_object_mut() {
            statement.remove("Resource");
        }
        let cleanup = PolicyDocument::new(vec![
            PolicyStatement {
                effect: "Allow".to_string(),
                action: vec!["s3:ListBucket".to_string()],
                resource: vec![get_att(bucket, "Arn")],
                principal: None,
            },
            PolicyStatement {
                effect: "Allow".to_string(),
                action: vec!["s3:DeleteObject".to_string()],
                resource: vec![sub(format!("${{{bucket}.Arn}}/*"))],
                principal: None,
            },
        ]);
        Ok(json!({
            "AssumeRolePolicyDocument": assume,
            "ManagedPolicyArns": ["arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"],
            "Policies": [{
                "PolicyName": "bucket-cleanup",
                "PolicyDocument": serde_json::to_value(cleanup)?,
            }],
        }))
    }
}

#[derive(Debug, Clone)]
pub struct CleanupFunction {
    pub role: LogicalId,
}

impl CfnResource for CleanupFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        Ok(json!({
            "Runtime": "python3.12",
            "Handler": "index.handler",
            "Timeout": 300,
            "Role": get_att(&self.role, "Arn"),
            "Code": { "ZipFile": CLEANUP_HANDLER },
        }))
    }
}

#[derive(Debug, Clone)]
pub struct CleanupCustomResource {
    pub function: LogicalId,
    pub bucket: LogicalId,
}

impl CfnResource for CleanupCustomResource {
    fn type_string(&self) -> &'static str {
        "Custom::CleanupBucket"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        Ok(json!({
            "ServiceToken": get_att(&self.function, "Arn"),
            "BucketName": get_ref(&self.bucket),
        }))
    }
}
