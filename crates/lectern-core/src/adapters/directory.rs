//! Keycloak-backed room directory. Group administration itself lives
//! elsewhere; the gateway only reads `(room path -> owner id)` from the
//! group's attributes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::RoomDirectory;
use crate::error::{PipelineError, Stage};

const OWNER_ATTRIBUTE: &str = "owner";

pub struct KeycloakDirectory {
    client: reqwest::Client,
    admin_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct GroupRepresentation {
    #[serde(default)]
    attributes: HashMap<String, Vec<String>>,
}

impl KeycloakDirectory {
    pub fn new(client: reqwest::Client, admin_url: String, token: String) -> Self {
        Self {
            client,
            admin_url,
            token,
        }
    }
}

#[async_trait]
impl RoomDirectory for KeycloakDirectory {
    async fn resolve_owner(&self, room_path: &str) -> Result<String, PipelineError> {
        let path = room_path.trim_start_matches('/');
        let url = format!(
            "{}/group-by-path/{path}",
            self.admin_url.trim_end_matches('/')
        );

        let group: GroupRepresentation = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::RoomDirectory, err.to_string()))?
            .json()
            .await
            .map_err(|err| {
                PipelineError::upstream(
                    Stage::RoomDirectory,
                    format!("malformed group payload: {err}"),
                )
            })?;

        group
            .attributes
            .get(OWNER_ATTRIBUTE)
            .and_then(|values| values.first())
            .map(|owner| owner.to_string())
            .ok_or_else(|| {
                PipelineError::upstream(
                    Stage::RoomDirectory,
                    format!("room '{room_path}' has no owner attribute"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_payload_owner_extraction() {
        let group: GroupRepresentation = serde_json::from_str(
            r#"{"id": "g-1", "path": "/2024/SoSe/Smith/Vision",
                "attributes": {"owner": ["prof-smith"], "visible": ["true"]}}"#,
        )
        .expect("parse");

        assert_eq!(
            group.attributes.get(OWNER_ATTRIBUTE).and_then(|v| v.first()),
            Some(&"prof-smith".to_string())
        );
    }

    #[test]
    fn missing_attributes_default_to_empty() {
        let group: GroupRepresentation =
            serde_json::from_str(r#"{"id": "g-1", "path": "/2024"}"#).expect("parse");
        assert!(group.attributes.is_empty());
    }
}
