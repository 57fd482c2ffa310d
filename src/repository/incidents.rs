use crate::config::RepositoryConfig;
use crate::error::{AppError, Result};
use crate::metrics::{INCIDENTS_COMPLETED_TOTAL, INCIDENTS_CREATED_TOTAL, TRANSCRIPT_MESSAGES_TOTAL};
use crate::models::{self, Incident, IncidentPatch, NewIncident, TranscriptMessage};
use crate::repository::{ActiveIndex, ACTIVE_INCIDENTS_KEY};
use crate::state::KeyValueStore;
use std::sync::Arc;

/// Owner of incident records and of the active-incidents index
///
/// Records live under their own id as key. Nothing else in the crate reads or
/// writes those keys or the index key.
#[derive(Clone)]
pub struct IncidentRepository {
    store: Arc<dyn KeyValueStore>,
    index: ActiveIndex,
}

impl IncidentRepository {
    /// Repository with default settings (read-modify-write index)
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, &RepositoryConfig::default())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: &RepositoryConfig) -> Self {
        let index = ActiveIndex::new(store.clone(), config.index_mode, config.max_index_retries);
        Self { store, index }
    }

    /// Get a reference to the active-incidents index
    pub fn index(&self) -> &ActiveIndex {
        &self.index
    }

    /// Create an incident and add it to the active index
    pub async fn create(&self, payload: NewIncident) -> Result<Incident> {
        let incident = Incident::from_payload(payload, models::now())?;

        self.save(&incident).await?;
        self.index.push(&incident.id).await?;

        INCIDENTS_CREATED_TOTAL.inc();
        tracing::info!(
            incident_id = %incident.id,
            status = ?incident.status.as_ref().map(|s| s.as_str()),
            "Incident created"
        );

        Ok(incident)
    }

    /// Fetch a record directly, whether or not it is still in the active index
    pub async fn get(&self, id: &str) -> Result<Incident> {
        self.load(id)
            .await?
            .ok_or_else(|| AppError::IncidentNotFound(id.to_string()))
    }

    /// Records in the active index, optionally restricted to one status
    ///
    /// Ids that no longer resolve are skipped. Index order is preserved.
    pub async fn list_by_status(&self, status: Option<&str>) -> Result<Vec<Incident>> {
        let ids = self.index.ids().await?;
        let values = self.store.get_many(&ids).await?;

        let mut incidents = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            let Some(value) = value else {
                tracing::debug!(incident_id = %id, "Skipping dangling index entry");
                continue;
            };

            let incident: Incident = serde_json::from_value(value)?;
            if status.map_or(true, |wanted| incident.has_status(wanted)) {
                incidents.push(incident);
            }
        }

        Ok(incidents)
    }

    /// Append a message to an incident's transcript
    pub async fn append_transcript(
        &self,
        id: &str,
        message: TranscriptMessage,
    ) -> Result<Incident> {
        let mut incident = self.get(id).await?;

        incident.append_message(message, models::now())?;
        self.save(&incident).await?;

        TRANSCRIPT_MESSAGES_TOTAL.inc();
        tracing::info!(
            incident_id = %id,
            transcript_len = incident.transcript.len(),
            "Transcript updated"
        );

        Ok(incident)
    }

    /// Shallow-merge `updates` onto an incident
    ///
    /// When the patch sets `status` to `completed` the id also leaves the active
    /// index. The record is written first; if the index write then fails the
    /// record stays updated.
    pub async fn patch(&self, id: &str, updates: IncidentPatch) -> Result<Incident> {
        let existing = self.get(id).await?;

        let updated = existing.merged_with(&updates, models::now())?;
        self.save(&updated).await?;

        if updates.completes() {
            let removed = self.index.remove(id).await?;
            INCIDENTS_COMPLETED_TOTAL.inc();
            tracing::info!(incident_id = %id, removed_from_index = removed, "Incident completed");
        } else {
            tracing::info!(incident_id = %id, "Incident updated");
        }

        Ok(updated)
    }

    async fn load(&self, id: &str) -> Result<Option<Incident>> {
        if id == ACTIVE_INCIDENTS_KEY {
            return Ok(None);
        }

        match self.store.get(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, incident: &Incident) -> Result<()> {
        let value = serde_json::to_value(incident)?;
        self.store.set(&incident.id, value).await
    }
}
