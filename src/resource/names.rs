//! Provider naming rules for explicit physical names

use serde::Deserialize;
use std::net::Ipv4Addr;

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;
const MAX_FUNCTION_NAME_LEN: usize = 64;
const MIN_TABLE_NAME_LEN: usize = 3;
const MAX_TABLE_NAME_LEN: usize = 255;
const MAX_LOG_GROUP_NAME_LEN: usize = 512;
const MAX_STAGE_NAME_LEN: usize = 128;

/// Naming rule attached to a string option in the kind schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameFormat {
    BucketName,
    FunctionName,
    TableName,
    LogGroupName,
    StageName,
}

impl NameFormat {
    /// Check `name`, returning the violated rule
    pub fn check(&self, name: &str) -> Result<(), String> {
        match self {
            Self::BucketName => check_bucket_name(name),
            Self::FunctionName => check_charset(
                name,
                1,
                MAX_FUNCTION_NAME_LEN,
                |b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_',
                "letters, numbers, hyphens and underscores",
            ),
            Self::TableName => check_charset(
                name,
                MIN_TABLE_NAME_LEN,
                MAX_TABLE_NAME_LEN,
                |b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-',
                "letters, numbers, '.', '_' and '-'",
            ),
            Self::LogGroupName => check_charset(
                name,
                1,
                MAX_LOG_GROUP_NAME_LEN,
                |b| b.is_ascii_alphanumeric() || b"._-/#".contains(&b),
                "letters, numbers, '.', '_', '-', '/' and '#'",
            ),
            Self::StageName => check_charset(
                name,
                1,
                MAX_STAGE_NAME_LEN,
                |b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_',
                "letters, numbers, hyphens and underscores",
            ),
        }
    }
}

fn check_charset(
    name: &str,
    min: usize,
    max: usize,
    allowed: impl Fn(u8) -> bool,
    described: &str,
) -> Result<(), String> {
    if !(min..=max).contains(&name.len()) {
        return Err(format!("must be between {} and {} characters long", min, max));
    }
    if !name.bytes().all(allowed) {
        return Err(format!("must only contain {}", described));
    }
    Ok(())
}

fn check_bucket_name(name: &str) -> Result<(), String> {
    check_charset(
        name,
        MIN_BUCKET_NAME_LEN,
        MAX_BUCKET_NAME_LEN,
        |b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.',
        "lowercase letters, numbers, hyphens and dots",
    )?;

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return Err("must start and end with a letter or number".to_string());
    }
    if name.contains("..") {
        return Err("must not contain consecutive dots".to_string());
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return Err("must not be formatted as an IP address".to_string());
    }
    if name.starts_with("xn--") || name.ends_with("-s3alias") {
        return Err("must not use the reserved 'xn--' prefix or '-s3alias' suffix".to_string());
    }
    Ok(())
}
