use crate::service::{ArtifactService, ListRequest, LoadRequest, SaveRequest};
use async_trait::async_trait;
use loom_core::{Artifacts, Part, Result};
use std::sync::Arc;

/// Binds an [`ArtifactService`] to one app/user/session triple so callers can
/// use the simple `loom_core::Artifacts` API without repeating scope on
/// every call.
pub struct ScopedArtifacts {
    service: Arc<dyn ArtifactService>,
    app_name: String,
    user_id: String,
    session_id: String,
}

impl ScopedArtifacts {
    pub fn new(service: Arc<dyn ArtifactService>, app_name: String, user_id: String, session_id: String) -> Self {
        Self { service, app_name, user_id, session_id }
    }
}

#[async_trait]
impl Artifacts for ScopedArtifacts {
    async fn save(&self, name: &str, data: &Part) -> Result<i64> {
        let resp = self
            .service
            .save(SaveRequest {
                app_name: self.app_name.clone(),
                user_id: self.user_id.clone(),
                session_id: self.session_id.clone(),
                file_name: name.to_string(),
                part: data.clone(),
                version: None,
            })
            .await?;
        Ok(resp.version)
    }

    async fn load(&self, name: &str, version: Option<i64>) -> Result<Part> {
        let resp = self
            .service
            .load(LoadRequest {
                app_name: self.app_name.clone(),
                user_id: self.user_id.clone(),
                session_id: self.session_id.clone(),
                file_name: name.to_string(),
                version,
            })
            .await?;
        Ok(resp.part)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let resp = self
            .service
            .list(ListRequest {
                app_name: self.app_name.clone(),
                user_id: self.user_id.clone(),
                session_id: self.session_id.clone(),
            })
            .await?;
        Ok(resp.file_names)
    }
}
