//! VPC and subnet layout.
//!
//! One /20 network over two availability zones, partitioned into three named
//! /24 subnet groups: `public` (load-balancer egress path and NAT gateways),
//! `private-alb` (the internal load balancer), and `private-app` (the
//! service tasks and the file system).

use serde_json::json;

use jenkins_iac_core::template::{availability_zone, r#ref};
use jenkins_iac_core::{Resource, Result, Template};

pub const VPC_CIDR: &str = "10.0.0.0/20";
pub const AZ_COUNT: usize = 2;

pub const GROUP_PUBLIC: &str = "public";
pub const GROUP_PRIVATE_ALB: &str = "private-alb";
pub const GROUP_PRIVATE_APP: &str = "private-app";

/// Logical ids of the network resources later composition steps reference.
#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: &'static str,
    pub public_subnets: Vec<String>,
    pub alb_subnets: Vec<String>,
    pub app_subnets: Vec<String>,
}

struct SubnetGroup {
    name: &'static str,
    logical_prefix: &'static str,
    /// Index of the group's first /24 inside the VPC range.
    cidr_offset: usize,
    public: bool,
}

const GROUPS: [SubnetGroup; 3] = [
    SubnetGroup {
        name: GROUP_PUBLIC,
        logical_prefix: "PublicSubnet",
        cidr_offset: 0,
        public: true,
    },
    SubnetGroup {
        name: GROUP_PRIVATE_ALB,
        logical_prefix: "AlbSubnet",
        cidr_offset: 2,
        public: false,
    },
    SubnetGroup {
        name: GROUP_PRIVATE_APP,
        logical_prefix: "AppSubnet",
        cidr_offset: 4,
        public: false,
    },
];

/// Declare the VPC, the three subnet groups across both availability zones,
/// and the routing that gives the private groups NAT egress.
pub fn compose_network(template: &mut Template, stack_name: &str) -> Result<Network> {
    template.add_resource(
        "Vpc",
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": VPC_CIDR,
                "EnableDnsSupport": true,
                "EnableDnsHostnames": true,
                "Tags": [{ "Key": "Name", "Value": stack_name }],
            }),
        ),
    )?;

    template.add_resource(
        "InternetGateway",
        Resource::new("AWS::EC2::InternetGateway", json!({})),
    )?;
    template.add_resource(
        "GatewayAttachment",
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": r#ref("Vpc"),
                "InternetGatewayId": r#ref("InternetGateway"),
            }),
        ),
    )?;

    let mut network = Network {
        vpc: "Vpc",
        public_subnets: Vec::new(),
        alb_subnets: Vec::new(),
        app_subnets: Vec::new(),
    };

    for group in &GROUPS {
        for az in 0..AZ_COUNT {
            let logical_id = format!("{}{}", group.logical_prefix, az + 1);
            template.add_resource(
                &logical_id,
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": r#ref("Vpc"),
                        "CidrBlock": format!("10.0.{}.0/24", group.cidr_offset + az),
                        "AvailabilityZone": availability_zone(az),
                        "MapPublicIpOnLaunch": false,
                        "Tags": [
                            { "Key": "Name", "Value": format!("{stack_name}/{}-{}", group.name, az + 1) },
                            { "Key": "subnet-group", "Value": group.name },
                        ],
                    }),
                ),
            )?;
            match group.name {
                GROUP_PUBLIC => network.public_subnets.push(logical_id),
                GROUP_PRIVATE_ALB => network.alb_subnets.push(logical_id),
                _ => network.app_subnets.push(logical_id),
            }
        }
    }

    compose_public_routing(template, &network)?;
    compose_private_routing(template, &network)?;

    Ok(network)
}

fn compose_public_routing(template: &mut Template, network: &Network) -> Result<()> {
    template.add_resource(
        "PublicRouteTable",
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({ "VpcId": r#ref("Vpc") }),
        ),
    )?;
    template.add_resource(
        "PublicDefaultRoute",
        Resource::new(
            "AWS::EC2::Route",
            json!({
                "RouteTableId": r#ref("PublicRouteTable"),
                "DestinationCidrBlock": "0.0.0.0/0",
                "GatewayId": r#ref("InternetGateway"),
            }),
        )
        .depends_on("GatewayAttachment"),
    )?;

    for (az, subnet) in network.public_subnets.iter().enumerate() {
        template.add_resource(
            format!("PublicSubnet{}RouteTableAssociation", az + 1),
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "SubnetId": r#ref(subnet),
                    "RouteTableId": r#ref("PublicRouteTable"),
                }),
            ),
        )?;

        // One NAT gateway per zone, living in the zone's public subnet.
        template.add_resource(
            format!("NatEip{}", az + 1),
            Resource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })),
        )?;
        template.add_resource(
            format!("NatGateway{}", az + 1),
            Resource::new(
                "AWS::EC2::NatGateway",
                json!({
                    "SubnetId": r#ref(subnet),
                    "AllocationId": { "Fn::GetAtt": [format!("NatEip{}", az + 1), "AllocationId"] },
                }),
            )
            .depends_on("GatewayAttachment"),
        )?;
    }
    Ok(())
}

fn compose_private_routing(template: &mut Template, network: &Network) -> Result<()> {
    // Both private groups in a zone share that zone's route table.
    for az in 0..AZ_COUNT {
        let route_table = format!("PrivateRouteTable{}", az + 1);
        template.add_resource(
            &route_table,
            Resource::new("AWS::EC2::RouteTable", json!({ "VpcId": r#ref("Vpc") })),
        )?;
        template.add_resource(
            format!("PrivateDefaultRoute{}", az + 1),
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": r#ref(&route_table),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": r#ref(&format!("NatGateway{}", az + 1)),
                }),
            ),
        )?;

        for subnet in [&network.alb_subnets[az], &network.app_subnets[az]] {
            template.add_resource(
                format!("{subnet}RouteTableAssociation"),
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "SubnetId": r#ref(subnet),
                        "RouteTableId": r#ref(&route_table),
                    }),
                ),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn network_template() -> (Template, Network) {
        let mut template = Template::new("test");
        let network = compose_network(&mut template, "jenkins-iac-dev").unwrap();
        (template, network)
    }

    #[test]
    fn test_one_vpc_six_subnets() {
        let (template, network) = network_template();
        assert_eq!(template.resource_count_of("AWS::EC2::VPC"), 1);
        assert_eq!(template.resource_count_of("AWS::EC2::Subnet"), 6);
        assert_eq!(network.public_subnets.len(), 2);
        assert_eq!(network.alb_subnets.len(), 2);
        assert_eq!(network.app_subnets.len(), 2);
    }

    #[test]
    fn test_subnets_partitioned_across_three_groups() {
        let (template, _) = network_template();
        for group in [GROUP_PUBLIC, GROUP_PRIVATE_ALB, GROUP_PRIVATE_APP] {
            let tagged = template
                .resources_of_type("AWS::EC2::Subnet")
                .into_iter()
                .filter(|(_, subnet)| {
                    subnet.properties["Tags"]
                        .as_array()
                        .is_some_and(|tags| {
                            tags.iter().any(|tag| {
                                tag["Key"] == "subnet-group" && tag["Value"] == group
                            })
                        })
                })
                .count();
            assert_eq!(tagged, 2, "group {group}");
        }
    }

    #[test]
    fn test_cidrs_do_not_overlap() {
        let (template, _) = network_template();
        let mut cidrs: Vec<String> = template
            .resources_of_type("AWS::EC2::Subnet")
            .iter()
            .map(|(_, subnet)| subnet.properties["CidrBlock"].as_str().unwrap().to_string())
            .collect();
        cidrs.sort();
        cidrs.dedup();
        assert_eq!(cidrs.len(), 6);
    }

    #[test]
    fn test_private_groups_route_through_nat() {
        let (template, _) = network_template();
        assert_eq!(template.resource_count_of("AWS::EC2::NatGateway"), 2);
        assert!(template.has_resource_properties(
            "AWS::EC2::Route",
            &json!({
                "RouteTableId": { "Ref": "PrivateRouteTable1" },
                "NatGatewayId": { "Ref": "NatGateway1" },
            })
        ));
        assert_eq!(
            template.resource_count_of("AWS::EC2::SubnetRouteTableAssociation"),
            6
        );
    }
}
