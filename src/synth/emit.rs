//! Template emission
//!
//! Maps each materialized declaration onto provider resources. Options have
//! already been validated and every reference resolved, so emission only
//! shapes values; the only failures left are missing generated attributes.

use super::naming;
use super::template::{Template, TemplateOutput, TemplateResource};
use crate::error::{DeployError, Result};
use crate::grant::PolicyStatement;
use crate::resolve::{Materialized, MaterializedResource};
use crate::resource::{ResourceKind, TABLE_NAME_ENV};
use crate::route::{self, Authorization, HttpMethod, RouteEntry, RoutePath};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const POLICY_VERSION: &str = "2012-10-17";
/// Managed "CachingOptimized" cache policy
const CACHING_OPTIMIZED_POLICY: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
const XRAY_WRITE_POLICY: &str = "arn:aws:iam::aws:policy/AWSXRayDaemonWriteAccess";
const DEFAULT_CORS_HEADERS: &[&str] = &["Content-Type", "X-Amz-Date", "Authorization", "X-Api-Key"];

fn option_str<'a>(res: &'a MaterializedResource, option: &str) -> Option<&'a str> {
    res.resolved.get(option).and_then(|v| v.as_str())
}

fn option_bool(res: &MaterializedResource, option: &str) -> bool {
    res.resolved
        .get(option)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn attr<'a>(res: &'a MaterializedResource, name: &str) -> Result<&'a str> {
    res.declaration.attribute(name).ok_or_else(|| {
        DeployError::Synthesis(format!(
            "'{}' has no generated attribute '{}'",
            res.declaration.id, name
        ))
    })
}

fn lookup_attr<'a>(materialized: &'a Materialized, id: &str, name: &str) -> Result<&'a str> {
    materialized.attribute(id, name).ok_or_else(|| {
        DeployError::Synthesis(format!("'{}' has no generated attribute '{}'", id, name))
    })
}

fn lambda_invocation_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
        region, function_arn
    )
}

/// Build the full template from a materialized descriptor
pub fn build_template(
    stack: &str,
    region: &str,
    materialized: &Materialized,
    statements: &[PolicyStatement],
    routes: &[RouteEntry],
    outputs: &BTreeMap<String, (String, Option<String>)>,
) -> Result<Template> {
    let mut template = Template::new(format!("sitestack deployment '{}'", stack));
    // bucket id -> bucket policy statements
    let mut bucket_policies: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for res in materialized.iter() {
        match res.declaration.kind {
            ResourceKind::Storage => emit_storage(&mut template, res, &mut bucket_policies)?,
            ResourceKind::Cdn => emit_cdn(&mut template, res, materialized, &mut bucket_policies)?,
            ResourceKind::Table => emit_table(&mut template, res)?,
            ResourceKind::LogGroup => emit_log_group(&mut template, res)?,
            ResourceKind::Function => {
                emit_function(&mut template, res, region, materialized, statements)?
            }
            ResourceKind::ApiGateway => emit_rest_api(&mut template, res, stack)?,
            ResourceKind::ResourcePath => emit_resource_path(&mut template, res, materialized)?,
        }
    }

    for (bucket, policy_statements) in bucket_policies {
        let res = materialized
            .get(&bucket)
            .ok_or_else(|| DeployError::Synthesis(format!("bucket '{}' is not materialized", bucket)))?;
        template.add(
            &format!("{}Policy", res.logical_id),
            TemplateResource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": attr(res, "bucketName")?,
                    "PolicyDocument": {
                        "Version": POLICY_VERSION,
                        "Statement": policy_statements,
                    },
                }),
            )
            .depends_on([res.logical_id.clone()]),
        )?;
    }

    let methods = emit_routes(&mut template, region, materialized, routes)?;
    emit_stages(&mut template, region, materialized, routes, &methods)?;

    for (name, (value, description)) in outputs {
        template.outputs.insert(
            name.clone(),
            TemplateOutput {
                description: description.clone(),
                value: value.clone(),
            },
        );
    }

    Ok(template)
}

fn emit_storage(
    template: &mut Template,
    res: &MaterializedResource,
    bucket_policies: &mut BTreeMap<String, Vec<Value>>,
) -> Result<()> {
    let public = option_bool(res, "publicAccess");
    let name = attr(res, "bucketName")?;
    let arn = attr(res, "arn")?;

    let mut props = Map::new();
    props.insert("BucketName".into(), json!(name));
    props.insert(
        "PublicAccessBlockConfiguration".into(),
        json!({
            "BlockPublicAcls": !public,
            "BlockPublicPolicy": !public,
            "IgnorePublicAcls": !public,
            "RestrictPublicBuckets": !public,
        }),
    );
    props.insert(
        "OwnershipControls".into(),
        json!({ "Rules": [{ "ObjectOwnership": "BucketOwnerEnforced" }] }),
    );

    let algorithm = match option_str(res, "encryption") {
        Some("KMS_MANAGED") => Some("aws:kms"),
        Some("UNENCRYPTED") => None,
        _ => Some("AES256"),
    };
    if let Some(algorithm) = algorithm {
        props.insert(
            "BucketEncryption".into(),
            json!({
                "ServerSideEncryptionConfiguration": [
                    { "ServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm } }
                ]
            }),
        );
    }
    if option_bool(res, "versioned") {
        props.insert("VersioningConfiguration".into(), json!({ "Status": "Enabled" }));
    }
    if public {
        let mut website = json!({ "IndexDocument": option_str(res, "indexDocument") });
        if let Some(error) = option_str(res, "errorDocument") {
            website["ErrorDocument"] = json!(error);
        }
        props.insert("WebsiteConfiguration".into(), website);
    }
    if option_bool(res, "autoDeleteObjects") {
        props.insert(
            "Tags".into(),
            json!([{ "Key": "sitestack:auto-delete-objects", "Value": "true" }]),
        );
    }

    let policies = bucket_policies.entry(res.declaration.id.clone()).or_default();
    if option_bool(res, "enforceTLS") {
        policies.push(json!({
            "Sid": "DenyInsecureTransport",
            "Effect": "Deny",
            "Principal": { "AWS": "*" },
            "Action": "s3:*",
            "Resource": [arn, format!("{}/*", arn)],
            "Condition": { "Bool": { "aws:SecureTransport": "false" } },
        }));
    }
    if public {
        policies.push(json!({
            "Sid": "AllowPublicRead",
            "Effect": "Allow",
            "Principal": { "AWS": "*" },
            "Action": "s3:GetObject",
            "Resource": format!("{}/*", arn),
        }));
    }
    if policies.is_empty() {
        bucket_policies.remove(&res.declaration.id);
    }

    template.add(
        &res.logical_id,
        TemplateResource::new("AWS::S3::Bucket", Value::Object(props))
            .retention(option_str(res, "retention")),
    )
}

/// Distribution reaching its bucket only through an origin access control
fn emit_cdn(
    template: &mut Template,
    res: &MaterializedResource,
    materialized: &Materialized,
    bucket_policies: &mut BTreeMap<String, Vec<Value>>,
) -> Result<()> {
    let origin = res.declaration.ref_opt("origin").ok_or_else(|| {
        DeployError::Synthesis(format!("'{}' has no origin", res.declaration.id))
    })?;
    let bucket = materialized.get(&origin.target).ok_or_else(|| {
        DeployError::unresolved(&res.declaration.id, &origin.target, "origin is not materialized")
    })?;
    let origin_domain = option_str(res, "origin").unwrap_or_default();
    let origin_id = format!("origin-{}", bucket.declaration.id);
    let oac_id = format!("{}Oac", res.logical_id);

    template.add(
        &oac_id,
        TemplateResource::new(
            "AWS::CloudFront::OriginAccessControl",
            json!({
                "OriginAccessControlConfig": {
                    "Name": format!("{}-oac", attr(res, "distributionId")?),
                    "OriginAccessControlOriginType": "s3",
                    "SigningBehavior": "always",
                    "SigningProtocol": "sigv4",
                }
            }),
        ),
    )?;

    let viewer_protocol = match option_str(res, "viewerProtocol") {
        Some("HTTPS_ONLY") => "https-only",
        Some("ALLOW_ALL") => "allow-all",
        _ => "redirect-to-https",
    };
    let root_object = option_str(res, "defaultRootObject").unwrap_or("index.html");

    let mut config = json!({
        "Enabled": true,
        "HttpVersion": "http2",
        "DefaultRootObject": root_object,
        "PriceClass": option_str(res, "priceClass"),
        "Origins": [{
            "Id": origin_id,
            "DomainName": origin_domain,
            "S3OriginConfig": { "OriginAccessIdentity": "" },
            "OriginAccessControlId": { "Fn::GetAtt": [oac_id, "Id"] },
        }],
        "DefaultCacheBehavior": {
            "TargetOriginId": origin_id,
            "ViewerProtocolPolicy": viewer_protocol,
            "AllowedMethods": ["GET", "HEAD"],
            "CachedMethods": ["GET", "HEAD"],
            "Compress": true,
            "CachePolicyId": CACHING_OPTIMIZED_POLICY,
        },
    });
    if let Some(comment) = option_str(res, "comment") {
        config["Comment"] = json!(comment);
    }
    if option_bool(res, "spaFallback") {
        let fallbacks: Vec<Value> = [403, 404]
            .iter()
            .map(|code| {
                json!({
                    "ErrorCode": code,
                    "ResponseCode": 200,
                    "ResponsePagePath": format!("/{}", root_object),
                })
            })
            .collect();
        config["CustomErrorResponses"] = Value::Array(fallbacks);
    }

    let bucket_arn = attr(bucket, "arn")?;
    bucket_policies
        .entry(bucket.declaration.id.clone())
        .or_default()
        .push(json!({
            "Sid": format!("AllowCdnRead{}", res.logical_id),
            "Effect": "Allow",
            "Principal": { "Service": "cloudfront.amazonaws.com" },
            "Action": "s3:GetObject",
            "Resource": format!("{}/*", bucket_arn),
            "Condition": { "StringEquals": { "AWS:SourceArn": attr(res, "arn")? } },
        }));

    template.add(
        &res.logical_id,
        TemplateResource::new(
            "AWS::CloudFront::Distribution",
            json!({ "DistributionConfig": config }),
        )
        .depends_on([oac_id, bucket.logical_id.clone()]),
    )
}

fn key_type(option: Option<&str>) -> &'static str {
    match option {
        Some("NUMBER") => "N",
        Some("BINARY") => "B",
        _ => "S",
    }
}

fn emit_table(template: &mut Template, res: &MaterializedResource) -> Result<()> {
    let partition = option_str(res, "partitionKeyName").unwrap_or_default();
    let mut key_schema = vec![json!({ "AttributeName": partition, "KeyType": "HASH" })];
    let mut attributes = vec![json!({
        "AttributeName": partition,
        "AttributeType": key_type(option_str(res, "partitionKeyType")),
    })];
    if let Some(sort) = option_str(res, "sortKeyName") {
        key_schema.push(json!({ "AttributeName": sort, "KeyType": "RANGE" }));
        attributes.push(json!({
            "AttributeName": sort,
            "AttributeType": key_type(option_str(res, "sortKeyType")),
        }));
    }

    let billing = option_str(res, "billingMode").unwrap_or("PAY_PER_REQUEST");
    let mut props = json!({
        "TableName": attr(res, "tableName")?,
        "KeySchema": key_schema,
        "AttributeDefinitions": attributes,
        "BillingMode": billing,
        "PointInTimeRecoverySpecification": {
            "PointInTimeRecoveryEnabled": option_bool(res, "pointInTimeRecovery"),
        },
    });
    if billing == "PROVISIONED" {
        props["ProvisionedThroughput"] = json!({
            "ReadCapacityUnits": res.resolved.get("readCapacity"),
            "WriteCapacityUnits": res.resolved.get("writeCapacity"),
        });
    }
    if let Some(ttl) = option_str(res, "ttlAttribute") {
        props["TimeToLiveSpecification"] = json!({ "AttributeName": ttl, "Enabled": true });
    }

    template.add(
        &res.logical_id,
        TemplateResource::new("AWS::DynamoDB::Table", props).retention(option_str(res, "retention")),
    )
}

fn emit_log_group(template: &mut Template, res: &MaterializedResource) -> Result<()> {
    template.add(
        &res.logical_id,
        TemplateResource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": attr(res, "logGroupName")?,
                "RetentionInDays": res.resolved.get("retentionDays"),
            }),
        )
        .retention(option_str(res, "retention")),
    )
}

/// Function plus its own execution role carrying only its grants
fn emit_function(
    template: &mut Template,
    res: &MaterializedResource,
    region: &str,
    materialized: &Materialized,
    statements: &[PolicyStatement],
) -> Result<()> {
    let id = &res.declaration.id;
    let role_id = format!("{}Role", res.logical_id);
    let function_name = attr(res, "functionName")?;
    let role_arn = attr(res, "roleArn")?;
    let account = role_arn.split(':').nth(4).unwrap_or_default();

    let log_group = match res.declaration.ref_opt("logGroup") {
        Some(r) => Some(lookup_attr(materialized, &r.target, "logGroupName")?),
        None => None,
    };
    let table_name = match res.declaration.ref_opt("table") {
        Some(r) => Some(lookup_attr(materialized, &r.target, "tableName")?),
        None => None,
    };

    // the function's own log stream; not a grant on another declaration
    let log_group_arn = match log_group {
        Some(name) => format!("arn:aws:logs:{}:{}:log-group:{}:*", region, account, name),
        None => format!(
            "arn:aws:logs:{}:{}:log-group:/aws/lambda/{}:*",
            region, account, function_name
        ),
    };
    let mut role_statements = vec![json!({
        "Sid": "RuntimeLogging",
        "Effect": "Allow",
        "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
        "Resource": log_group_arn,
    })];
    role_statements.extend(
        statements
            .iter()
            .filter(|s| &s.principal == id)
            .map(PolicyStatement::to_document),
    );

    let tracing_enabled = option_bool(res, "tracingEnabled");
    let mut role_props = json!({
        "RoleName": attr(res, "roleName")?,
        "AssumeRolePolicyDocument": {
            "Version": POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }],
        },
        "Policies": [{
            "PolicyName": format!("{}Policy", res.logical_id),
            "PolicyDocument": { "Version": POLICY_VERSION, "Statement": role_statements },
        }],
    });
    if tracing_enabled {
        role_props["ManagedPolicyArns"] = json!([XRAY_WRITE_POLICY]);
    }
    template.add(&role_id, TemplateResource::new("AWS::IAM::Role", role_props))?;

    let mut variables = res
        .resolved
        .get("envVars")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    if let Some(table_name) = table_name {
        variables.insert(TABLE_NAME_ENV.to_string(), json!(table_name));
    }

    let location = option_str(res, "codeLocation").unwrap_or_default();
    let code = match location.strip_prefix("s3://").and_then(|rest| rest.split_once('/')) {
        Some((bucket, key)) => json!({ "S3Bucket": bucket, "S3Key": key }),
        None => json!(location),
    };

    let mut props = json!({
        "FunctionName": function_name,
        "Runtime": option_str(res, "runtimeId"),
        "Handler": option_str(res, "handlerEntry"),
        "Code": code,
        "Role": role_arn,
        "Timeout": res.resolved.get("timeoutSeconds"),
        "MemorySize": res.resolved.get("memoryMB"),
        "TracingConfig": { "Mode": if tracing_enabled { "Active" } else { "PassThrough" } },
    });
    if !variables.is_empty() {
        props["Environment"] = json!({ "Variables": variables });
    }
    if let Some(log_group) = log_group {
        props["LoggingConfig"] = json!({ "LogGroup": log_group });
    }

    template.add(
        &res.logical_id,
        TemplateResource::new("AWS::Lambda::Function", props).depends_on([role_id]),
    )
}

fn emit_rest_api(template: &mut Template, res: &MaterializedResource, stack: &str) -> Result<()> {
    let name = option_str(res, "apiName")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", stack, res.declaration.id));
    let mut props = json!({
        "Name": name,
        "EndpointConfiguration": { "Types": ["REGIONAL"] },
    });
    if let Some(description) = option_str(res, "description") {
        props["Description"] = json!(description);
    }
    template.add(
        &res.logical_id,
        TemplateResource::new("AWS::ApiGateway::RestApi", props),
    )
}

fn emit_resource_path(
    template: &mut Template,
    res: &MaterializedResource,
    materialized: &Materialized,
) -> Result<()> {
    let depends: Vec<String> = ["parent", "restApi"]
        .iter()
        .filter_map(|opt| res.declaration.ref_opt(opt))
        .filter_map(|r| materialized.logical_id(&r.target))
        .map(str::to_string)
        .collect();
    template.add(
        &res.logical_id,
        TemplateResource::new(
            "AWS::ApiGateway::Resource",
            json!({
                "RestApiId": option_str(res, "restApi"),
                "ParentId": option_str(res, "parent"),
                "PathPart": option_str(res, "pathPart"),
            }),
        )
        .depends_on(depends),
    )
}

fn method_id(gateway: &str, path: &str, method: HttpMethod) -> Result<String> {
    let path: RoutePath = path.parse().map_err(|e| {
        DeployError::Synthesis(format!("route table holds an invalid path '{}': {}", path, e))
    })?;
    Ok(naming::method_logical_id(gateway, &path, method))
}

/// Methods, shared invocation permissions and CORS preflights
///
/// Returns method logical ids per gateway for deployment ordering.
fn emit_routes(
    template: &mut Template,
    region: &str,
    materialized: &Materialized,
    routes: &[RouteEntry],
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut methods: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut permissions: BTreeSet<String> = BTreeSet::new();

    for entry in routes {
        let gateway = materialized.get(&entry.gateway).ok_or_else(|| {
            DeployError::Synthesis(format!("gateway '{}' is not materialized", entry.gateway))
        })?;
        let function_arn = lookup_attr(materialized, &entry.handler, "arn")?;

        if permissions.insert(entry.integration.clone()) {
            template.add(
                &entry.integration,
                TemplateResource::new(
                    "AWS::Lambda::Permission",
                    json!({
                        "Action": "lambda:InvokeFunction",
                        "FunctionName": function_arn,
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": format!("{}/*/*/*", attr(gateway, "executeArn")?),
                    }),
                )
                .depends_on([materialized.logical_id(&entry.handler).unwrap_or_default().to_string()]),
            )?;
        }

        let method_id = method_id(&entry.gateway, &entry.path, entry.method)?;
        let mut props = json!({
            "RestApiId": attr(gateway, "restApiId")?,
            "ResourceId": entry.resource_id,
            "HttpMethod": entry.method.as_str(),
            "AuthorizationType": entry.authorization.provider_type(),
            "ApiKeyRequired": entry.authorization == Authorization::RequireApiKey,
            "Integration": {
                "Type": "AWS_PROXY",
                "IntegrationHttpMethod": "POST",
                "Uri": lambda_invocation_uri(region, function_arn),
            },
        });
        if entry.authorization == Authorization::RequireCustomAuthorizer {
            props["AuthorizerId"] = json!({ "Ref": format!("{}Authorizer", gateway.logical_id) });
        }
        template.add(
            &method_id,
            TemplateResource::new("AWS::ApiGateway::Method", props)
                .depends_on([entry.integration.clone()]),
        )?;
        methods
            .entry(entry.gateway.clone())
            .or_default()
            .push(method_id);
    }

    for (gateway_id, paths) in route::paths_by_gateway(routes) {
        let Some(gateway) = materialized.get(gateway_id) else {
            continue;
        };
        let origins = gateway.declaration.list_opt("corsAllowOrigins");
        if origins.is_empty() {
            continue;
        }
        for (path, resource_id) in paths {
            let bound: Vec<HttpMethod> = routes
                .iter()
                .filter(|e| e.gateway == gateway_id && e.path == path)
                .map(|e| e.method)
                .collect();
            if bound.iter().any(|m| m.overlaps(&HttpMethod::Options)) {
                continue;
            }
            let method_id = method_id(gateway_id, path, HttpMethod::Options)?;
            template.add(
                &method_id,
                cors_preflight(gateway, resource_id, &origins, &bound)?,
            )?;
            methods
                .entry(gateway_id.to_string())
                .or_default()
                .push(method_id);
        }
    }

    Ok(methods)
}

fn cors_preflight(
    gateway: &MaterializedResource,
    resource_id: &str,
    origins: &[&str],
    bound: &[HttpMethod],
) -> Result<TemplateResource> {
    let mut allow_methods: Vec<String> = gateway
        .declaration
        .list_opt("corsAllowMethods")
        .into_iter()
        .map(str::to_string)
        .collect();
    if allow_methods.is_empty() {
        allow_methods = bound.iter().map(|m| m.to_string()).collect();
        allow_methods.push(HttpMethod::Options.to_string());
    }
    let mut allow_headers = gateway.declaration.list_opt("corsAllowHeaders");
    if allow_headers.is_empty() {
        allow_headers = DEFAULT_CORS_HEADERS.to_vec();
    }

    let wildcard = origins.contains(&"*");
    let mut response_parameters = json!({
        "method.response.header.Access-Control-Allow-Headers": format!("'{}'", allow_headers.join(",")),
        "method.response.header.Access-Control-Allow-Methods": format!("'{}'", allow_methods.join(",")),
    });
    let mut integration_response = json!({ "StatusCode": "204" });

    if wildcard || origins.len() == 1 {
        let origin = if wildcard { "*" } else { origins[0] };
        response_parameters["method.response.header.Access-Control-Allow-Origin"] =
            json!(format!("'{}'", origin));
    } else {
        // several origins: echo the caller's origin when it is allowed
        let checks: Vec<String> = origins
            .iter()
            .map(|o| format!("$origin == \"{}\"", o))
            .collect();
        response_parameters["method.response.header.Access-Control-Allow-Origin"] =
            json!(format!("'{}'", origins[0]));
        response_parameters["method.response.header.Vary"] = json!("'Origin'");
        integration_response["ResponseTemplates"] = json!({
            "application/json": format!(
                "#set($origin = $input.params().header.get(\"Origin\"))\n#if($origin == \"\") #set($origin = $input.params().header.get(\"origin\")) #end\n#if({})\n  #set($context.responseOverride.header.Access-Control-Allow-Origin = $origin)\n#end",
                checks.join(" || ")
            )
        });
    }
    integration_response["ResponseParameters"] = response_parameters.clone();

    let method_parameters: Map<String, Value> = response_parameters
        .as_object()
        .map(|m| m.keys().map(|k| (k.clone(), json!(true))).collect())
        .unwrap_or_default();

    Ok(TemplateResource::new(
        "AWS::ApiGateway::Method",
        json!({
            "RestApiId": attr(gateway, "restApiId")?,
            "ResourceId": resource_id,
            "HttpMethod": "OPTIONS",
            "AuthorizationType": "NONE",
            "Integration": {
                "Type": "MOCK",
                "RequestTemplates": { "application/json": "{ statusCode: 200 }" },
                "IntegrationResponses": [integration_response],
            },
            "MethodResponses": [{ "StatusCode": "204", "ResponseParameters": method_parameters }],
        }),
    ))
}

/// Deployment, stage, authorizer and API key plumbing per gateway
fn emit_stages(
    template: &mut Template,
    region: &str,
    materialized: &Materialized,
    routes: &[RouteEntry],
    methods: &BTreeMap<String, Vec<String>>,
) -> Result<()> {
    for gateway in materialized
        .iter()
        .filter(|r| r.declaration.kind == ResourceKind::ApiGateway)
    {
        let id = gateway.declaration.id.as_str();
        let logical = gateway.logical_id.as_str();
        let rest_api_id = attr(gateway, "restApiId")?;
        let stage_name = option_str(gateway, "stageName").unwrap_or("prod");
        let gateway_routes: Vec<&RouteEntry> = routes.iter().filter(|e| e.gateway == id).collect();

        if let Some(authorizer) = gateway.declaration.ref_opt("authorizer") {
            let function_arn = lookup_attr(materialized, &authorizer.target, "arn")?;
            template.add(
                &format!("{}Authorizer", logical),
                TemplateResource::new(
                    "AWS::ApiGateway::Authorizer",
                    json!({
                        "Name": format!("{}-authorizer", id),
                        "RestApiId": rest_api_id,
                        "Type": "TOKEN",
                        "IdentitySource": "method.request.header.Authorization",
                        "AuthorizerUri": lambda_invocation_uri(region, function_arn),
                    }),
                )
                .depends_on([logical.to_string()]),
            )?;
            template.add(
                &format!("{}AuthorizerPermission", logical),
                TemplateResource::new(
                    "AWS::Lambda::Permission",
                    json!({
                        "Action": "lambda:InvokeFunction",
                        "FunctionName": function_arn,
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": format!("{}/authorizers/*", attr(gateway, "executeArn")?),
                    }),
                ),
            )?;
        }

        // a deployment needs at least one method
        let Some(method_ids) = methods.get(id).filter(|m| !m.is_empty()).cloned() else {
            continue;
        };
        let deployment_id = format!("{}Deployment", logical);
        let stage_id = format!("{}Stage", logical);
        template.add(
            &deployment_id,
            TemplateResource::new(
                "AWS::ApiGateway::Deployment",
                json!({ "RestApiId": rest_api_id }),
            )
            .depends_on(method_ids),
        )?;

        template.add(
            &stage_id,
            TemplateResource::new(
                "AWS::ApiGateway::Stage",
                json!({
                    "RestApiId": rest_api_id,
                    "StageName": stage_name,
                    "DeploymentId": { "Ref": deployment_id },
                    "TracingEnabled": option_bool(gateway, "tracingEnabled"),
                    "MethodSettings": [{
                        "ResourcePath": "/*",
                        "HttpMethod": "*",
                        "LoggingLevel": option_str(gateway, "loggingLevel").unwrap_or("OFF"),
                        "MetricsEnabled": option_bool(gateway, "metricsEnabled"),
                        "DataTraceEnabled": false,
                    }],
                }),
            ),
        )?;

        if gateway_routes
            .iter()
            .any(|e| e.authorization == Authorization::RequireApiKey)
        {
            let key_id = format!("{}ApiKey", logical);
            let plan_id = format!("{}UsagePlan", logical);
            template.add(
                &key_id,
                TemplateResource::new(
                    "AWS::ApiGateway::ApiKey",
                    json!({ "Name": format!("{}-key", id), "Enabled": true }),
                ),
            )?;
            template.add(
                &plan_id,
                TemplateResource::new(
                    "AWS::ApiGateway::UsagePlan",
                    json!({
                        "UsagePlanName": format!("{}-usage", id),
                        "ApiStages": [{ "ApiId": rest_api_id, "Stage": stage_name }],
                    }),
                )
                .depends_on([stage_id.clone()]),
            )?;
            template.add(
                &format!("{}UsagePlanKey", logical),
                TemplateResource::new(
                    "AWS::ApiGateway::UsagePlanKey",
                    json!({
                        "KeyId": { "Ref": key_id },
                        "KeyType": "API_KEY",
                        "UsagePlanId": { "Ref": plan_id },
                    }),
                ),
            )?;
        }
    }
    Ok(())
}
