//! Room ownership and membership checks.
//!
//! Ownership resolution goes through the [`RoomDirectory`] trait so the
//! Keycloak lookup stays a thin, swappable collaborator. The checks run
//! before any upstream call or filesystem write.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;

/// The authenticated caller, as established by the fronting proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    /// Group paths the caller belongs to, each with a leading slash.
    pub groups: Vec<String>,
}

/// Resolves a room path to the identity that owns it.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn resolve_owner(&self, room_path: &str) -> Result<String, PipelineError>;
}

#[derive(Clone)]
pub struct AccessGuard {
    directory: Arc<dyn RoomDirectory>,
}

impl AccessGuard {
    pub fn new(directory: Arc<dyn RoomDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve_owner(&self, room_path: &str) -> Result<String, PipelineError> {
        self.directory.resolve_owner(room_path).await
    }

    /// Write-like actions are restricted to the room's owner. Returns the
    /// owner id on success so callers do not resolve it twice.
    pub async fn check_publish(
        &self,
        principal: &Principal,
        room_path: &str,
    ) -> Result<String, PipelineError> {
        let owner = self.resolve_owner(room_path).await?;
        if owner == principal.subject {
            Ok(owner)
        } else {
            Err(PipelineError::denied(&principal.subject, room_path))
        }
    }

    /// Read-like actions require the caller's group list to contain the
    /// room path.
    pub fn check_read(&self, principal: &Principal, room_path: &str) -> Result<(), PipelineError> {
        let wanted = with_leading_slash(room_path);
        if principal.groups.iter().any(|group| group == &wanted) {
            Ok(())
        } else {
            Err(PipelineError::denied(&principal.subject, room_path))
        }
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDirectory(&'static str);

    #[async_trait]
    impl RoomDirectory for FixedDirectory {
        async fn resolve_owner(&self, _room_path: &str) -> Result<String, PipelineError> {
            Ok(self.0.to_string())
        }
    }

    fn guard() -> AccessGuard {
        AccessGuard::new(Arc::new(FixedDirectory("prof-smith")))
    }

    fn principal(subject: &str, groups: &[&str]) -> Principal {
        Principal {
            subject: subject.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn owner_may_publish() {
        let owner = guard()
            .check_publish(&principal("prof-smith", &[]), "/2024/SoSe/Smith/Vision")
            .await
            .expect("owner allowed");
        assert_eq!(owner, "prof-smith");
    }

    #[tokio::test]
    async fn non_owner_publish_is_denied() {
        let err = guard()
            .check_publish(&principal("student-1", &[]), "/2024/SoSe/Smith/Vision")
            .await
            .expect_err("denied");
        assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));
    }

    #[test]
    fn member_may_read() {
        let result = guard().check_read(
            &principal("student-1", &["/2024/SoSe/Smith/Vision"]),
            "2024/SoSe/Smith/Vision",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn non_member_read_is_denied() {
        let err = guard()
            .check_read(
                &principal("student-1", &["/2024/WiSe/Jones/Graphics"]),
                "/2024/SoSe/Smith/Vision",
            )
            .expect_err("denied");
        assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));
    }
}
