use crate::config::TransportsConfig;
use anyhow::{Context, Result, bail};
use devlink::DeviceSpec;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Per-device overrides of the fleet-wide transport defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceOverrides {
    /// Management port override
    pub port: Option<u16>,
    /// Per-RPC timeout override
    pub timeout_secs: Option<u64>,
    /// Username override
    pub username: Option<String>,
    /// ssh_config override
    pub ssh_config: Option<String>,
}

/// One device of the fleet. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Device {
    /// Fully qualified domain name, the device identity
    pub fqdn: String,
    /// Role, used only for selection
    pub role: String,
    /// Site, used only for selection
    pub site: String,
    /// Platform tag selecting the transport implementation
    pub platform: String,
    /// Transport overrides
    pub overrides: DeviceOverrides,
}

impl Device {
    /// Build the transport spec for this device, merging fleet defaults
    /// with per-device overrides.
    pub fn to_spec(&self, defaults: &TransportsConfig) -> DeviceSpec {
        DeviceSpec {
            fqdn: self.fqdn.clone(),
            platform: self.platform.clone(),
            username: self
                .overrides
                .username
                .clone()
                .unwrap_or_else(|| defaults.username.clone()),
            password: defaults.password.clone(),
            port: self.overrides.port,
            timeout: Some(Duration::from_secs(
                self.overrides.timeout_secs.unwrap_or(defaults.timeout_secs),
            )),
            ssh_config: self
                .overrides
                .ssh_config
                .clone()
                .or_else(|| defaults.ssh_config.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    role: String,
    site: String,
    platform: String,
    #[serde(default)]
    config: DeviceOverrides,
}

/// The device fleet, keyed by FQDN, with role and site indexes.
#[derive(Debug, Default)]
pub struct Inventory {
    devices: Vec<Device>,
}

impl Inventory {
    /// Load the inventory from a YAML file.
    ///
    /// The file maps FQDN to role/site/platform and optional transport
    /// overrides. FQDNs are unique by construction of the mapping; devices
    /// come out sorted by FQDN ascending.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read inventory {}", path.display()))?;
        let raw: BTreeMap<String, RawDevice> = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid inventory file {}", path.display()))?;

        let devices = raw
            .into_iter()
            .map(|(fqdn, d)| Device {
                fqdn,
                role: d.role,
                site: d.site,
                platform: d.platform,
                overrides: d.config,
            })
            .collect();
        Self::from_devices(devices)
    }

    /// Build an inventory from already-constructed devices (tests, embeds).
    pub fn from_devices(mut devices: Vec<Device>) -> Result<Self> {
        devices.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        for pair in devices.windows(2) {
            if pair[0].fqdn == pair[1].fqdn {
                bail!("Duplicate device identity: {}", pair[0].fqdn);
            }
        }
        Ok(Self { devices })
    }

    /// Whether the inventory is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All devices with the given role.
    pub fn role(&self, name: &str) -> Vec<&Device> {
        self.devices.iter().filter(|d| d.role == name).collect()
    }

    /// All devices within the given site.
    pub fn site(&self, name: &str) -> Vec<&Device> {
        self.devices.iter().filter(|d| d.site == name).collect()
    }

    /// Select devices by query: `role:<name>`, `site:<name>`, or an FQDN
    /// glob (`*` and `?` wildcards). Results keep the stable FQDN order.
    pub fn select(&self, query: &str) -> Result<Vec<&Device>> {
        if let Some(name) = query.strip_prefix("role:") {
            return Ok(self.role(name));
        }
        if let Some(name) = query.strip_prefix("site:") {
            return Ok(self.site(name));
        }

        let pattern = glob_to_regex(query)?;
        Ok(self
            .devices
            .iter()
            .filter(|d| pattern.is_match(&d.fqdn))
            .collect())
    }
}

/// Translate an FQDN glob into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).with_context(|| format!("Invalid device query: {glob}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const INVENTORY: &str = "\
leaf2.example.com:
  role: leaf
  site: eqiad
  platform: junos
leaf1.example.com:
  role: leaf
  site: codfw
  platform: junos
  config:
    port: 2222
    timeout_secs: 10
spine1.example.com:
  role: spine
  site: eqiad
  platform: srlinux
";

    fn inventory() -> Inventory {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();
        Inventory::load(file.path()).unwrap()
    }

    #[test]
    fn test_load_sorts_by_fqdn() {
        let inv = inventory();
        let fqdns: Vec<_> = inv.select("*").unwrap().iter().map(|d| d.fqdn.clone()).collect();
        assert_eq!(
            fqdns,
            vec!["leaf1.example.com", "leaf2.example.com", "spine1.example.com"]
        );
    }

    #[test]
    fn test_select_by_role_and_site() {
        let inv = inventory();
        assert_eq!(inv.select("role:leaf").unwrap().len(), 2);
        assert_eq!(inv.select("site:eqiad").unwrap().len(), 2);
        assert_eq!(inv.select("role:border").unwrap().len(), 0);
    }

    #[test]
    fn test_select_by_glob() {
        let inv = inventory();
        assert_eq!(inv.select("leaf*").unwrap().len(), 2);
        assert_eq!(inv.select("leaf?.example.com").unwrap().len(), 2);
        assert_eq!(inv.select("spine1.example.com").unwrap().len(), 1);
        // A glob is anchored; a bare prefix matches nothing.
        assert_eq!(inv.select("leaf1").unwrap().len(), 0);
    }

    #[test]
    fn test_overrides_merge_with_defaults() {
        let inv = inventory();
        let defaults = TransportsConfig {
            username: "automation".to_string(),
            timeout_secs: 30,
            ..Default::default()
        };

        let leaf1 = &inv.select("leaf1.example.com").unwrap()[0].to_spec(&defaults);
        assert_eq!(leaf1.port, Some(2222));
        assert_eq!(leaf1.timeout, Some(Duration::from_secs(10)));
        assert_eq!(leaf1.username, "automation");

        let leaf2 = &inv.select("leaf2.example.com").unwrap()[0].to_spec(&defaults);
        assert_eq!(leaf2.port, None);
        assert_eq!(leaf2.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_duplicate_fqdn_rejected() {
        let device = Device {
            fqdn: "leaf1.example.com".to_string(),
            role: "leaf".to_string(),
            site: "eqiad".to_string(),
            platform: "junos".to_string(),
            overrides: DeviceOverrides::default(),
        };
        let err = Inventory::from_devices(vec![device.clone(), device]).unwrap_err();
        assert!(err.to_string().contains("Duplicate device identity"));
    }
}
