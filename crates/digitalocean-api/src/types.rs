use serde::{Deserialize, Serialize};

// ── Droplet types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub monitoring: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DropletResponse {
    pub droplet: Droplet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    /// One of `new`, `active`, `off`, `archive`.
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Droplet {
    /// Public IPv4 address, if DigitalOcean has assigned one yet.
    pub fn public_ipv4(&self) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|net| net.kind == "public")
            .map(|net| net.ip_address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_public_address_over_private() {
        let droplet: Droplet = serde_json::from_value(serde_json::json!({
            "id": 3164444,
            "name": "survival",
            "status": "active",
            "networks": {
                "v4": [
                    { "ip_address": "10.128.192.124", "type": "private" },
                    { "ip_address": "104.236.32.182", "type": "public" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(droplet.public_ipv4(), Some("104.236.32.182"));
    }

    #[test]
    fn fresh_droplet_has_no_address() {
        let droplet: Droplet = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "survival",
            "status": "new",
            "networks": { "v4": [] }
        }))
        .unwrap();

        assert_eq!(droplet.public_ipv4(), None);
    }
}
