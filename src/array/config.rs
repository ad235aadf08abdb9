//! Array Configuration
//!
//! Parses the array definitions file and resolves the management IP of each
//! array from its endpoint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{debug, warn};

// =============================================================================
// Transport Protocol
// =============================================================================

/// Block transport protocol preferred for an array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransportType {
    #[default]
    Auto,
    Iscsi,
    Fc,
    Nvme,
    Nfs,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Auto => "AUTO",
            TransportType::Iscsi => "ISCSI",
            TransportType::Fc => "FC",
            TransportType::Nvme => "NVME",
            TransportType::Nfs => "NFS",
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "" | "AUTO" => Ok(TransportType::Auto),
            "ISCSI" => Ok(TransportType::Iscsi),
            "FC" => Ok(TransportType::Fc),
            "NVME" | "NVMETCP" | "NVMEFC" => Ok(TransportType::Nvme),
            "NFS" => Ok(TransportType::Nfs),
            other => Err(Error::Configuration(format!("unknown transport protocol: {}", other))),
        }
    }
}

impl TryFrom<String> for TransportType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TransportType> for String {
    fn from(value: TransportType) -> Self {
        value.as_str().to_string()
    }
}

// =============================================================================
// Array Definition
// =============================================================================

/// One array entry of the configuration file
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConfig {
    /// Management API endpoint, e.g. `https://10.0.0.1/api/rest`
    pub endpoint: String,
    #[serde(rename = "globalID", default)]
    pub global_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub nas_name: Option<String>,
    #[serde(default)]
    pub block_protocol: TransportType,
    #[serde(rename = "skipCertificateValidation", default)]
    pub insecure: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl std::fmt::Debug for ArrayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayConfig")
            .field("endpoint", &self.endpoint)
            .field("global_id", &self.global_id)
            .field("username", &self.username)
            .field("nas_name", &self.nas_name)
            .field("block_protocol", &self.block_protocol)
            .field("insecure", &self.insecure)
            .field("is_default", &self.is_default)
            .finish()
    }
}

impl ArrayConfig {
    /// Check the fields every array must carry
    pub fn validate(&self) -> Result<()> {
        if self.global_id.is_empty() {
            return Err(Error::Configuration(
                "no globalID field found in array configuration".into(),
            ));
        }
        if self.endpoint.is_empty() {
            return Err(Error::Configuration(format!(
                "array {} has no endpoint",
                self.global_id
            )));
        }
        Ok(())
    }

    /// Management address used to index the array.
    ///
    /// The first IPv4 literal in the endpoint; an FQDN endpoint falls back to
    /// its host component.
    pub fn resolve_ip(&self) -> Result<String> {
        if let Some(ip) = ipv4_addresses(&self.endpoint).first() {
            return Ok(ip.to_string());
        }

        warn!(
            endpoint = %self.endpoint,
            "no IP found in endpoint, treating it as an FQDN"
        );
        let host = self
            .endpoint
            .split('/')
            .nth(2)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!("can't get ips from endpoint: {}", self.endpoint))
            })?;

        // Looks like an address but did not parse as one
        if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(Error::Configuration(format!(
                "can't get ips from endpoint: {}",
                self.endpoint
            )));
        }
        Ok(host.to_string())
    }
}

/// Layout of the array configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArraysFile {
    #[serde(default)]
    pub arrays: Vec<ArrayConfig>,
}

// =============================================================================
// Configuration Source
// =============================================================================

/// Where array definitions come from on load and reload
#[derive(Debug, Clone)]
pub enum ArrayConfigSource {
    /// A YAML file on disk
    File(PathBuf),
    /// YAML held in memory
    Yaml(String),
    /// Already parsed definitions
    Static(Vec<ArrayConfig>),
}

impl ArrayConfigSource {
    /// Load and validate all array definitions
    pub fn load(&self) -> Result<Vec<ArrayConfig>> {
        let arrays = match self {
            ArrayConfigSource::File(path) => {
                debug!(path = %path.display(), "reading array configuration");
                let data = std::fs::read_to_string(path)?;
                serde_yaml::from_str::<ArraysFile>(&data)?.arrays
            }
            ArrayConfigSource::Yaml(data) => serde_yaml::from_str::<ArraysFile>(data)?.arrays,
            ArrayConfigSource::Static(arrays) => arrays.clone(),
        };

        for array in &arrays {
            array.validate()?;
        }
        Ok(arrays)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// All IPv4 literals embedded in a string, in order of appearance
pub fn ipv4_addresses(s: &str) -> Vec<Ipv4Addr> {
    s.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<Ipv4Addr>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
arrays:
  - endpoint: "https://10.0.0.1/api/rest"
    globalID: "PS000000000001"
    username: "admin"
    password: "secret"
    blockProtocol: "iscsi"
    skipCertificateValidation: true
  - endpoint: "https://array-b.example.com/api/rest"
    globalID: "PS000000000002"
    username: "admin"
    password: "secret"
    isDefault: true
"#;

    #[test]
    fn test_parse_arrays_file() {
        let arrays = ArrayConfigSource::Yaml(CONFIG.into()).load().unwrap();
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].global_id, "PS000000000001");
        assert_eq!(arrays[0].block_protocol, TransportType::Iscsi);
        assert!(arrays[0].insecure);
        assert_eq!(arrays[1].block_protocol, TransportType::Auto);
        assert!(arrays[1].is_default);
    }

    #[test]
    fn test_missing_global_id_rejected() {
        let yaml = "arrays:\n  - endpoint: \"https://10.0.0.1/api/rest\"\n";
        let err = ArrayConfigSource::Yaml(yaml.into()).load().unwrap_err();
        assert!(err.to_string().contains("globalID"));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let yaml = "arrays:\n  - endpoint: \"https://10.0.0.1\"\n    globalID: \"PS1\"\n    blockProtocol: \"carrier-pigeon\"\n";
        assert!(ArrayConfigSource::Yaml(yaml.into()).load().is_err());
    }

    #[test]
    fn test_resolve_ip() {
        let arrays = ArrayConfigSource::Yaml(CONFIG.into()).load().unwrap();
        assert_eq!(arrays[0].resolve_ip().unwrap(), "10.0.0.1");
        assert_eq!(arrays[1].resolve_ip().unwrap(), "array-b.example.com");

        let mut bad = arrays[0].clone();
        bad.endpoint = "https://10.0.0/api".into();
        assert!(bad.resolve_ip().is_err());
    }

    #[test]
    fn test_ipv4_addresses() {
        assert_eq!(
            ipv4_addresses("csi-node-3f9a-192.168.1.20"),
            vec!["192.168.1.20".parse::<Ipv4Addr>().unwrap()]
        );
        assert_eq!(ipv4_addresses("https://10.1.1.1:443/api").len(), 1);
        assert!(ipv4_addresses("no-address-here").is_empty());
    }

    #[test]
    fn test_debug_redacts_password() {
        let arrays = ArrayConfigSource::Yaml(CONFIG.into()).load().unwrap();
        assert!(!format!("{:?}", arrays[0]).contains("secret"));
    }
}
