//! Download token issuance, validation, and consumption.
//!
//! Tokens are 32 random bytes hex-encoded (256 bits of entropy), bound to
//! one (dataset, user, format, compression) tuple, and single-use:
//! consumption is an atomic compare-and-swap, so of two concurrent
//! consumers exactly one wins. Validation and consumption are synchronous
//! map operations guarded by a std RwLock; issuance is async because it
//! consults the external permission check and catalog.

use chrono::{Duration, Utc};
use datashare_core::models::dataset::DatasetOperation;
use datashare_core::models::download::{DownloadToken, TokenInfo};
use datashare_core::models::format::{classify, Compression, DatasetFormat};
use datashare_core::AppError;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::catalog::{AccessChecker, DatasetCatalog};
use crate::AppResult;

pub struct TokenManager {
    catalog: Arc<dyn DatasetCatalog>,
    access: Arc<dyn AccessChecker>,
    tokens: RwLock<HashMap<String, Arc<DownloadToken>>>,
    default_ttl: Duration,
}

impl TokenManager {
    pub fn new(
        catalog: Arc<dyn DatasetCatalog>,
        access: Arc<dyn AccessChecker>,
        default_ttl_secs: u64,
    ) -> Self {
        TokenManager {
            catalog,
            access,
            tokens: RwLock::new(HashMap::new()),
            default_ttl: Duration::seconds(default_ttl_secs as i64),
        }
    }

    fn generate_token() -> String {
        let mut buf = [0u8; 32];
        rand::rng().fill_bytes(&mut buf);
        hex::encode(buf)
    }

    /// Issue a download token after the external capability check.
    ///
    /// Fails with `PermissionDenied` when access is rejected and with
    /// `DatasetUnavailable` when the dataset has no physical copy to serve.
    pub async fn issue(
        &self,
        dataset_id: Uuid,
        user_id: Uuid,
        format: DatasetFormat,
        compression: Compression,
        ttl: Option<Duration>,
    ) -> AppResult<TokenInfo> {
        if !self
            .access
            .can_access(user_id, dataset_id, DatasetOperation::Download)
            .await
        {
            return Err(AppError::PermissionDenied(format!(
                "User {} may not download dataset {}",
                user_id, dataset_id
            )));
        }

        let dataset = self
            .catalog
            .get_dataset(dataset_id)
            .await?
            .ok_or_else(|| AppError::DatasetUnavailable(format!("Dataset {} not found", dataset_id)))?;

        if !dataset.has_storage() {
            return Err(AppError::DatasetUnavailable(format!(
                "Dataset {} has no stored file",
                dataset_id
            )));
        }

        let identity = dataset.stored_format == format;
        let resumable = classify(identity, compression).supports_offset();

        let token = Arc::new(DownloadToken::new(
            Self::generate_token(),
            dataset_id,
            user_id,
            format,
            compression,
            ttl.unwrap_or(self.default_ttl),
            resumable,
        ));
        let info = TokenInfo::from(token.as_ref());

        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(token.token.clone(), token);

        tracing::info!(
            dataset_id = %dataset_id,
            user_id = %user_id,
            format = %format,
            compression = %compression,
            expires_at = %info.expires_at,
            "Download token issued"
        );

        Ok(info)
    }

    fn lookup(&self, token: &str) -> AppResult<Arc<DownloadToken>> {
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::TokenNotFound(token.to_string()))
    }

    /// Validate a token for use.
    ///
    /// `for_retry` permits re-validating an already-consumed single-use
    /// token, which is how a retry of a completed-then-disputed transfer is
    /// explicitly distinguished from plain token reuse.
    pub fn validate(&self, token: &str, for_retry: bool) -> AppResult<TokenInfo> {
        let record = self.lookup(token)?;

        if record.is_expired(Utc::now()) {
            return Err(AppError::TokenExpired(token.to_string()));
        }

        if record.single_use && record.is_consumed() && !for_retry {
            return Err(AppError::TokenAlreadyConsumed(token.to_string()));
        }

        Ok(TokenInfo::from(record.as_ref()))
    }

    /// Mark a token consumed. Idempotent; returns `Ok(true)` for the caller
    /// that actually flipped the flag and `TokenAlreadyConsumed` for every
    /// later caller, so concurrent single-use consumers race cleanly.
    pub fn consume(&self, token: &str) -> AppResult<bool> {
        let record = self.lookup(token)?;
        if record.try_consume() {
            tracing::debug!(dataset_id = %record.dataset_id, "Download token consumed");
            Ok(true)
        } else {
            Err(AppError::TokenAlreadyConsumed(token.to_string()))
        }
    }

    /// Drop tokens past expiry plus the GC grace window.
    pub fn gc_expired(&self) -> usize {
        let cutoff = Utc::now()
            - Duration::seconds(datashare_core::constants::TOKEN_GC_GRACE_SECS as i64);
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > cutoff);
        before - tokens.len()
    }

    /// Background expiry loop. Spawn once at startup.
    pub fn spawn_gc(self: &Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let tokens = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let reclaimed = tokens.gc_expired();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, "Reclaimed expired download tokens");
                }
            }
        })
    }
}
