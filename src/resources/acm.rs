use super::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainValidationOption {
    pub domain_name: String,
    pub hosted_zone_id: Value,
}

/// A DNS validated ACM certificate. This only works if the following is true:
/// - The domain you'd like to get a certificate for is hosted in Amazon Route 53
/// - The hosted zone resides in the account doing the deployment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Certificate {
    pub domain_name: String,
    pub validation_method: String,
    pub domain_validation_options: Vec<DomainValidationOption>,
}

impl Certificate {
    pub fn dns_validated(domain_name: &str, zone: &LogicalId) -> Result<Self, String> {
        if domain_name.is_empty() {
            return Err("Must provide a domain name".to_string());
        }
        if domain_name.contains('*') {
            if domain_name.matches('*').count() > 1 {
                return Err(format!("Must only provide 1 wildcard. {domain_name} is invalid."));
            }
            if !domain_name.starts_with("*.") {
                return Err(format!(
                    "If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {domain_name} is invalid."
                ));
            }
        }
        if domain_name.ends_with('.') {
            return Err(format!(
                "Certificate domain cannot end with a dot. {domain_name} is invalid."
            ));
        }
        Ok(Self {
            domain_name: domain_name.to_string(),
            validation_method: "DNS".to_string(),
            domain_validation_options: vec![DomainValidationOption {
                domain_name: domain_name.to_string(),
                hosted_zone_id: get_ref(zone),
            }],
        })
    }
}

impl CfnResource for Certificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
