//! Named-secret management.
//!
//! The manager is crypto-agnostic: every name and value passes through an
//! injected `DataProtector`, and the repository only ever sees ciphertext.
//! Because names are stored encrypted and unindexed, lookups decrypt every
//! name for the user, O(n) in their secret count. That is an intentional
//! tradeoff for keeping the store encryption-agnostic.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::protect::DataProtector;
use strongroom_common::{Error, Result, UserId};
use strongroom_storage::{SecretRecord, SecretRepository};

/// Decrypted view of one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEntry {
    pub name: String,
    pub value: String,
}

/// Per-user secret CRUD over encrypted fields.
pub struct SecretManager {
    secrets: Arc<dyn SecretRepository>,
}

impl SecretManager {
    pub fn new(secrets: Arc<dyn SecretRepository>) -> Self {
        Self { secrets }
    }

    /// Create a named secret.
    ///
    /// # Errors
    /// - `InvalidInput` on empty name or value
    /// - `AlreadyExists` if the user already has a secret with this name
    pub async fn create(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
        name: &str,
        value: &str,
    ) -> Result<()> {
        if name.trim().is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "Secret name and value are required".to_string(),
            ));
        }

        if self.find_record(protector, user_id, name).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "A secret named '{}' already exists",
                name
            )));
        }

        let now = Utc::now();
        let record = SecretRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            name: protector.protect(name).await?,
            value: protector.protect(value).await?,
            created_at: now,
            updated_at: now,
        };

        self.secrets.add(record).await?;
        debug!(user_id = %user_id, "Secret created");
        Ok(())
    }

    /// Read a secret's value by name.
    pub async fn get(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
        name: &str,
    ) -> Result<Option<String>> {
        match self.find_record(protector, user_id, name).await? {
            Some(record) => Ok(Some(protector.unprotect(&record.value).await?)),
            None => Ok(None),
        }
    }

    /// Replace a secret's value.
    ///
    /// # Errors
    /// - `NotFound` if the user has no secret with this name
    pub async fn update(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
        name: &str,
        value: &str,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(Error::InvalidInput("Secret value is required".to_string()));
        }

        let mut record = self
            .find_record(protector, user_id, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No secret named '{}'", name)))?;

        record.value = protector.protect(value).await?;
        record.updated_at = Utc::now();

        self.secrets.update(&record).await?;
        debug!(user_id = %user_id, "Secret updated");
        Ok(())
    }

    /// Delete a secret by name.
    ///
    /// # Errors
    /// - `NotFound` if the user has no secret with this name
    pub async fn delete(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
        name: &str,
    ) -> Result<()> {
        let record = self
            .find_record(protector, user_id, name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No secret named '{}'", name)))?;

        self.secrets.remove(&record.id).await?;
        debug!(user_id = %user_id, "Secret deleted");
        Ok(())
    }

    /// Decrypted names and values of all of a user's secrets.
    pub async fn list(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
    ) -> Result<Vec<SecretEntry>> {
        let records = self.secrets.find_by_user(user_id).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            entries.push(SecretEntry {
                name: protector.unprotect(&record.name).await?,
                value: protector.unprotect(&record.value).await?,
            });
        }
        Ok(entries)
    }

    /// Find a user's record by decrypted name.
    ///
    /// Decrypts every stored name for the user to compare.
    async fn find_record(
        &self,
        protector: &dyn DataProtector,
        user_id: &UserId,
        name: &str,
    ) -> Result<Option<SecretRecord>> {
        for record in self.secrets.find_by_user(user_id).await? {
            if protector.unprotect(&record.name).await? == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
