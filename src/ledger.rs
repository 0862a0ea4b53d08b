//! Video Ownership Ledger: the single authority for "who may currently
//! access video V".
//!
//! Ownership is an append-only history of account ids; the current owner is
//! always derived as the last entry, never stored on its own, so access
//! control has exactly one source of truth.

use crate::error::ExchangeError;
use crate::types::{AccountId, VideoId};
use sled::Tree;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::sync::Arc;

pub(crate) const VIDEO_PREFIX: &str = "video/";

pub(crate) fn video_key(id: &VideoId) -> Vec<u8> {
    [VIDEO_PREFIX.as_bytes(), id.as_bytes()].concat()
}

/// Run a closure as one sled transaction on the default tree, unwrapping the
/// abort-vs-storage distinction into the crate error type.
pub(crate) fn atomic<T>(
    tree: &Tree,
    op: impl Fn(&TransactionalTree) -> ConflictableTransactionResult<T, ExchangeError>,
) -> Result<T, ExchangeError> {
    tree.transaction(op).map_err(|err| match err {
        TransactionError::Abort(domain) => domain,
        TransactionError::Storage(store) => store.into(),
    })
}

pub(crate) fn abort<T>(err: ExchangeError) -> ConflictableTransactionResult<T, ExchangeError> {
    Err(ConflictableTransactionError::Abort(err))
}

/// One video asset and its chronological chain of owners.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct VideoRecord {
    #[n(0)]
    id: VideoId,
    #[n(1)]
    ownership_history: Vec<AccountId>,
}

impl VideoRecord {
    pub fn new(id: VideoId, uploader: AccountId) -> Self {
        Self {
            id,
            ownership_history: vec![uploader],
        }
    }

    pub fn id(&self) -> &VideoId {
        &self.id
    }

    /// The last history entry. The history is populated at creation and only
    /// ever appended to, so it is never empty.
    pub fn current_owner(&self) -> &AccountId {
        self.ownership_history
            .last()
            .expect("ownership history is populated at creation")
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        self.current_owner() == account
    }

    pub fn ownership_history(&self) -> &[AccountId] {
        &self.ownership_history
    }

    /// Append `to` as the new owner. Fails with `OwnershipConflict` when the
    /// current owner is not `from`, which is the guard against spending the
    /// same video twice.
    pub fn transfer_to(&mut self, from: &AccountId, to: &AccountId) -> Result<(), ExchangeError> {
        if from == to {
            return Err(ExchangeError::Validation(
                "cannot transfer a video to its current owner".into(),
            ));
        }

        let holder = self.current_owner();
        if holder != from {
            return Err(ExchangeError::OwnershipConflict {
                video: self.id.to_string(),
                expected: from.to_string(),
                holder: holder.to_string(),
            });
        }

        self.ownership_history.push(to.clone());
        Ok(())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, ExchangeError> {
        Ok(minicbor::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, ExchangeError> {
        Ok(minicbor::decode(bytes)?)
    }
}

/// Store-backed ledger operations. Shares its keyspace with
/// [`crate::service::ExchangeService`], which performs the two transfers of an
/// acceptance inside its own transaction.
pub struct VideoLedger {
    db: Arc<sled::Db>,
}

impl VideoLedger {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    /// Register a freshly uploaded video with a single-element history.
    pub fn publish(&self, uploader: AccountId) -> Result<VideoRecord, ExchangeError> {
        let record = VideoRecord::new(VideoId::generate(), uploader);
        self.db.insert(video_key(record.id()), record.encode()?)?;

        tracing::debug!(video = %record.id(), owner = %record.current_owner(), "video published");
        Ok(record)
    }

    pub fn get(&self, video: &VideoId) -> Result<VideoRecord, ExchangeError> {
        let bytes = self
            .db
            .get(video_key(video))?
            .ok_or_else(|| ExchangeError::NotFound {
                kind: "video",
                id: video.to_string(),
            })?;

        VideoRecord::decode(&bytes)
    }

    pub fn current_owner(&self, video: &VideoId) -> Result<AccountId, ExchangeError> {
        Ok(self.get(video)?.current_owner().clone())
    }

    pub fn is_owned_by(&self, video: &VideoId, account: &AccountId) -> Result<bool, ExchangeError> {
        Ok(self.get(video)?.is_owned_by(account))
    }

    pub fn history(&self, video: &VideoId) -> Result<Vec<AccountId>, ExchangeError> {
        Ok(self.get(video)?.ownership_history().to_vec())
    }

    /// Move current ownership of `video` from `from` to `to`. The read,
    /// owner check and append happen in one transaction, so a concurrent
    /// transfer of the same video loses with `OwnershipConflict`.
    pub fn transfer(
        &self,
        video: &VideoId,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<VideoRecord, ExchangeError> {
        let record = atomic(&self.db, |tx| {
            let key = video_key(video);
            let Some(bytes) = tx.get(&key)? else {
                return abort(ExchangeError::NotFound {
                    kind: "video",
                    id: video.to_string(),
                });
            };

            let mut record =
                VideoRecord::decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
            record
                .transfer_to(from, to)
                .map_err(ConflictableTransactionError::Abort)?;

            let encoded = record
                .encode()
                .map_err(ConflictableTransactionError::Abort)?;
            tx.insert(key, encoded)?;
            Ok(record)
        })?;

        tracing::info!(video = %video, from = %from, to = %to, "ownership transferred");
        Ok(record)
    }
}
