use super::*;

/// this is static for all of AWS for aliases to CloudFront.
/// see https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_ALIAS_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// CloudFormation validates parameters of this type against the zones
/// in the account, so a bad lookup fails before anything is created.
pub const HOSTED_ZONE_ID_PARAMETER_TYPE: &str = "AWS::Route53::HostedZone::Id";

/// A reference to an existing hosted zone. This is never created or
/// destroyed by the stack. The id gets resolved by name when the
/// deployment runs, and is handed to the templates as a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZoneLookup {
    pub domain_name: String,
}

impl HostedZoneLookup {
    pub fn new<S: Into<String>>(domain_name: S) -> Self {
        Self { domain_name: domain_name.into() }
    }

    /// hosted zone names are fully qualified, and must end in a dot.
    pub fn zone_name(&self) -> String {
        fully_qualified(&self.domain_name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasTarget {
    #[serde(rename = "DNSName")]
    pub dns_name: Value,
    pub hosted_zone_id: String,
    pub evaluate_target_health: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasRecord {
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    pub hosted_zone_id: Value,
    pub alias_target: AliasTarget,
    pub comment: String,
}

impl AliasRecord {
    /// an A record that points `name` at a cloudfront distribution.
    pub fn cloudfront(name: &str, zone: &LogicalId, distribution: &LogicalId) -> Self {
        Self {
            name: fully_qualified(name),
            record_type: "A".to_string(),
            hosted_zone_id: get_ref(zone),
            alias_target: AliasTarget {
                dns_name: get_att(distribution, "DomainName"),
                hosted_zone_id: CLOUDFRONT_ALIAS_HOSTED_ZONE_ID.to_string(),
                evaluate_target_health: false,
            },
            comment: name.trim_end_matches('.').to_string(),
        }
    }
}

impl CfnResource for AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn fully_qualified(name: &str) -> String {
    let mut out = name.to_string();
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_name_ends_with_dot() {
        assert_eq!(HostedZoneLookup::new("example.com").zone_name(), "example.com.");
        assert_eq!(HostedZoneLookup::new("example.com.").zone_name(), "example.com.");
    }

    #[test]
    fn alias_record_targets_distribution() {
        let zone = LogicalId::new("HostedZoneId").unwrap();
        let dist = LogicalId::new("CdnDistribution").unwrap();
        let record = AliasRecord::cloudfront("cdn.example.com", &zone, &dist);
        let props = record.properties().unwrap();
        assert_eq!(props["Name"], "cdn.example.com.");
        assert_eq!(props["Type"], "A");
        assert_eq!(props["HostedZoneId"], get_ref("HostedZoneId"));
        assert_eq!(props["AliasTarget"]["DNSName"], get_att("CdnDistribution", "DomainName"));
        assert_eq!(props["AliasTarget"]["HostedZoneId"], CLOUDFRONT_ALIAS_HOSTED_ZONE_ID);
    }
}
