//! Service layer: the atomic exchange operations over the shared store.
//!
//! The service is stateless between calls; every mutating operation is a
//! single sled transaction on the default tree (read, check preconditions,
//! conditionally write). That transaction is the only synchronization point,
//! so two concurrent accepts of one exchange resolve to exactly one terminal
//! state, and two exchanges racing to spend the same video produce at most
//! one winner. Notification events fire only after a commit.

use crate::error::ExchangeError;
use crate::exchange::{Exchange, ExchangeStatus};
use crate::ledger::{self, VideoLedger, VideoRecord, abort, atomic};
use crate::notify::{EventKind, NotificationEvent, NotificationSink, TracingSink};
use crate::rating::Rating;
use crate::types::{AccountId, ExchangeId, VideoId};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use std::sync::Arc;

/// Page size of [`ExchangeService::list_for_account`].
pub const PAGE_SIZE: usize = 20;

pub(crate) fn exchange_key(id: &ExchangeId) -> Vec<u8> {
    [b"exch/".as_slice(), id.as_bytes()].concat()
}

// Guards against duplicate proposals: one entry per still-pending
// (responder_video, responder, initiator) triple. The responder is part of
// the key because a video can change hands while older proposals for it are
// still pending; guards of different responders must not collide.
fn pending_key(responder_video: &VideoId, responder: &AccountId, initiator: &AccountId) -> Vec<u8> {
    [
        b"pending/".as_slice(),
        responder_video.as_bytes(),
        b"/",
        responder.as_bytes(),
        b"/",
        initiator.as_bytes(),
    ]
    .concat()
}

// Drop an exchange's guard entry, but only if the entry still belongs to it.
fn remove_pending_guard(
    tx: &TransactionalTree,
    exchange: &Exchange,
) -> Result<(), sled::transaction::UnabortableTransactionError> {
    let key = pending_key(
        &exchange.responder_video,
        &exchange.responder,
        &exchange.initiator,
    );
    if let Some(existing) = tx.get(&key)?
        && existing.as_ref() == exchange.id.as_bytes()
    {
        tx.remove(key)?;
    }
    Ok(())
}

// Per-account listing index. The timestamp component keeps the scan in
// chronological order; bech32 ids never contain '/'.
fn account_index_key(account: &AccountId, exchange: &Exchange) -> Vec<u8> {
    let stamp = exchange.requested_date.index_bytes();
    [
        account_index_prefix(account).as_slice(),
        stamp.as_slice(),
        exchange.id.as_bytes(),
    ]
    .concat()
}

fn account_index_prefix(account: &AccountId) -> Vec<u8> {
    [b"acct/".as_slice(), account.as_bytes(), b"/"].concat()
}

fn rating_key(exchange: &ExchangeId, author: &AccountId) -> Vec<u8> {
    [
        b"rating/".as_slice(),
        exchange.as_bytes(),
        b"/",
        author.as_bytes(),
    ]
    .concat()
}

fn load_exchange(
    tx: &TransactionalTree,
    id: &ExchangeId,
) -> Result<Exchange, ConflictableTransactionError<ExchangeError>> {
    let Some(bytes) = tx.get(exchange_key(id))? else {
        return Err(ConflictableTransactionError::Abort(
            ExchangeError::NotFound {
                kind: "exchange",
                id: id.to_string(),
            },
        ));
    };
    Exchange::decode(&bytes).map_err(ConflictableTransactionError::Abort)
}

fn load_video(
    tx: &TransactionalTree,
    id: &VideoId,
) -> Result<VideoRecord, ConflictableTransactionError<ExchangeError>> {
    let Some(bytes) = tx.get(ledger::video_key(id))? else {
        return Err(ConflictableTransactionError::Abort(
            ExchangeError::NotFound {
                kind: "video",
                id: id.to_string(),
            },
        ));
    };
    VideoRecord::decode(&bytes).map_err(ConflictableTransactionError::Abort)
}

pub struct ExchangeService {
    db: Arc<sled::Db>,
    sink: Arc<dyn NotificationSink>,
}

impl ExchangeService {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self::with_sink(db, Arc::new(TracingSink))
    }

    pub fn with_sink(db: Arc<sled::Db>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { db, sink }
    }

    /// Ledger view over the same keyspace.
    pub fn ledger(&self) -> VideoLedger {
        VideoLedger::new(self.db.clone())
    }

    /// Register an uploaded video under its uploader.
    pub fn publish_video(&self, uploader: AccountId) -> Result<VideoRecord, ExchangeError> {
        self.ledger().publish(uploader)
    }

    /// Create a pending exchange: `initiator` requests access to
    /// `responder_video` and may already fix the video they offer in return.
    pub fn propose(
        &self,
        initiator: AccountId,
        responder: AccountId,
        responder_video: VideoId,
        initiator_video: Option<VideoId>,
    ) -> Result<Exchange, ExchangeError> {
        let exchange = Exchange::new(initiator, responder, responder_video, initiator_video)?;

        let exchange = atomic(&self.db, |tx| {
            let responder_record = load_video(tx, &exchange.responder_video)?;
            if !responder_record.is_owned_by(&exchange.responder) {
                return abort(ExchangeError::OwnershipConflict {
                    video: exchange.responder_video.to_string(),
                    expected: exchange.responder.to_string(),
                    holder: responder_record.current_owner().to_string(),
                });
            }

            if let Some(offered) = &exchange.initiator_video {
                let offered_record = load_video(tx, offered)?;
                if !offered_record.is_owned_by(&exchange.initiator) {
                    return abort(ExchangeError::OwnershipConflict {
                        video: offered.to_string(),
                        expected: exchange.initiator.to_string(),
                        holder: offered_record.current_owner().to_string(),
                    });
                }
            }

            // idempotent-proposal guard: a still-pending proposal for the
            // same video between the same accounts blocks a second one
            let guard_key = pending_key(
                &exchange.responder_video,
                &exchange.responder,
                &exchange.initiator,
            );
            if let Some(existing) = tx.get(&guard_key)? {
                let existing_id = ExchangeId::from(String::from_utf8_lossy(&existing).into_owned());
                if let Some(bytes) = tx.get(exchange_key(&existing_id))? {
                    let existing = Exchange::decode(&bytes)
                        .map_err(ConflictableTransactionError::Abort)?;
                    if existing.status == ExchangeStatus::Pending {
                        return abort(ExchangeError::DuplicateProposal {
                            video: exchange.responder_video.to_string(),
                        });
                    }
                }
            }

            let encoded = exchange.encode().map_err(ConflictableTransactionError::Abort)?;
            tx.insert(exchange_key(&exchange.id), encoded)?;
            tx.insert(guard_key, exchange.id.as_bytes())?;
            tx.insert(
                account_index_key(&exchange.initiator, &exchange),
                exchange.id.as_bytes(),
            )?;
            tx.insert(
                account_index_key(&exchange.responder, &exchange),
                exchange.id.as_bytes(),
            )?;

            Ok(exchange.clone())
        })?;

        tracing::info!(
            exchange = %exchange.id,
            initiator = %exchange.initiator,
            responder = %exchange.responder,
            "exchange proposed"
        );
        self.notify(
            EventKind::ExchangeRequested,
            &exchange.id,
            &[&exchange.responder],
        );
        Ok(exchange)
    }

    /// Resolve a pending exchange to `Accepted`. Only the responder has
    /// standing; the initiator's offered video must have been fixed at
    /// proposal time or be supplied here. The status flip and both ownership
    /// transfers commit together or not at all; on `OwnershipConflict` the
    /// exchange stays pending.
    pub fn accept(
        &self,
        exchange_id: &ExchangeId,
        acting: &AccountId,
        initiator_video: Option<VideoId>,
    ) -> Result<Exchange, ExchangeError> {
        let exchange = atomic(&self.db, |tx| {
            let mut exchange = load_exchange(tx, exchange_id)?;

            if exchange.status.is_terminal() {
                return abort(ExchangeError::InvalidTransition {
                    exchange: exchange.id.to_string(),
                    status: exchange.status.to_string(),
                });
            }
            if acting != &exchange.responder {
                return abort(ExchangeError::Validation(format!(
                    "only the responder may accept exchange {}",
                    exchange.id
                )));
            }

            let Some(offered) = initiator_video
                .clone()
                .or_else(|| exchange.initiator_video.clone())
            else {
                return abort(ExchangeError::Validation(
                    "acceptance requires the initiator's offered video".into(),
                ));
            };

            // state transition first: it validates the offered asset before
            // any ownership is touched
            exchange
                .mark_accepted(offered.clone())
                .map_err(ConflictableTransactionError::Abort)?;

            let mut responder_record = load_video(tx, &exchange.responder_video)?;
            let mut initiator_record = load_video(tx, &offered)?;
            responder_record
                .transfer_to(&exchange.responder, &exchange.initiator)
                .map_err(ConflictableTransactionError::Abort)?;
            initiator_record
                .transfer_to(&exchange.initiator, &exchange.responder)
                .map_err(ConflictableTransactionError::Abort)?;

            tx.insert(
                ledger::video_key(&exchange.responder_video),
                responder_record.encode().map_err(ConflictableTransactionError::Abort)?,
            )?;
            tx.insert(
                ledger::video_key(&offered),
                initiator_record.encode().map_err(ConflictableTransactionError::Abort)?,
            )?;
            tx.insert(
                exchange_key(&exchange.id),
                exchange.encode().map_err(ConflictableTransactionError::Abort)?,
            )?;
            remove_pending_guard(tx, &exchange)?;

            Ok(exchange)
        })?;

        tracing::info!(exchange = %exchange.id, "exchange accepted, ownership swapped");
        self.notify(
            EventKind::ExchangeAccepted,
            &exchange.id,
            &[&exchange.initiator, &exchange.responder],
        );
        Ok(exchange)
    }

    /// Resolve a pending exchange to `Rejected`: the responder declining or
    /// the initiator cancelling. No ownership moves.
    pub fn reject(
        &self,
        exchange_id: &ExchangeId,
        acting: &AccountId,
    ) -> Result<Exchange, ExchangeError> {
        let exchange = atomic(&self.db, |tx| {
            let mut exchange = load_exchange(tx, exchange_id)?;
            exchange
                .mark_rejected(acting)
                .map_err(ConflictableTransactionError::Abort)?;

            tx.insert(
                exchange_key(&exchange.id),
                exchange.encode().map_err(ConflictableTransactionError::Abort)?,
            )?;
            remove_pending_guard(tx, &exchange)?;

            Ok(exchange)
        })?;

        tracing::info!(exchange = %exchange.id, by = %acting, "exchange rejected");
        self.notify(
            EventKind::ExchangeRejected,
            &exchange.id,
            &[&exchange.initiator, &exchange.responder],
        );
        Ok(exchange)
    }

    pub fn get(&self, exchange_id: &ExchangeId) -> Result<Exchange, ExchangeError> {
        let bytes = self
            .db
            .get(exchange_key(exchange_id))?
            .ok_or_else(|| ExchangeError::NotFound {
                kind: "exchange",
                id: exchange_id.to_string(),
            })?;
        Exchange::decode(&bytes)
    }

    /// Exchanges in which the account is either party, newest first.
    /// Zero-based pages of [`PAGE_SIZE`].
    pub fn list_for_account(
        &self,
        account: &AccountId,
        page: usize,
    ) -> Result<Vec<Exchange>, ExchangeError> {
        let mut exchanges = Vec::new();
        for item in self
            .db
            .scan_prefix(account_index_prefix(account))
            .rev()
            .skip(page.saturating_mul(PAGE_SIZE))
            .take(PAGE_SIZE)
        {
            let (_, id_bytes) = item?;
            let id = ExchangeId::from(String::from_utf8_lossy(&id_bytes).into_owned());
            exchanges.push(self.get(&id)?);
        }
        Ok(exchanges)
    }

    /// True iff the exchange is accepted, the account took part, and the
    /// account has not rated yet.
    pub fn can_rate(
        &self,
        exchange_id: &ExchangeId,
        account: &AccountId,
    ) -> Result<bool, ExchangeError> {
        let exchange = self.get(exchange_id)?;
        Ok(exchange.status == ExchangeStatus::Accepted
            && exchange.is_party(account)
            && !self.has_rated(exchange_id, account)?)
    }

    /// Submit the account's single rating for the counterpart's delivered
    /// video. Eligibility is re-checked inside the transaction, so a
    /// concurrent double submit loses with `NotEligible`.
    pub fn submit_rating(
        &self,
        exchange_id: &ExchangeId,
        account: &AccountId,
        value: f32,
        comment: Option<&str>,
    ) -> Result<Rating, ExchangeError> {
        let rating = atomic(&self.db, |tx| {
            let exchange = load_exchange(tx, exchange_id)?;

            let key = rating_key(exchange_id, account);
            if tx.get(&key)?.is_some() {
                return abort(ExchangeError::NotEligible(format!(
                    "account {account} already rated exchange {exchange_id}"
                )));
            }

            let rating = Rating::for_exchange(&exchange, account, value, comment)
                .map_err(ConflictableTransactionError::Abort)?;
            tx.insert(
                key,
                rating.encode().map_err(ConflictableTransactionError::Abort)?,
            )?;
            Ok(rating)
        })?;

        tracing::info!(
            exchange = %exchange_id,
            author = %account,
            value = rating.value.as_f32(),
            "rating submitted"
        );
        Ok(rating)
    }

    /// Pure existence query over ratings, never a stored flag.
    pub fn has_rated(
        &self,
        exchange_id: &ExchangeId,
        account: &AccountId,
    ) -> Result<bool, ExchangeError> {
        Ok(self.db.get(rating_key(exchange_id, account))?.is_some())
    }

    pub fn rating_for(
        &self,
        exchange_id: &ExchangeId,
        account: &AccountId,
    ) -> Result<Option<Rating>, ExchangeError> {
        match self.db.get(rating_key(exchange_id, account))? {
            Some(bytes) => Ok(Some(Rating::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn notify(&self, kind: EventKind, exchange: &ExchangeId, accounts: &[&AccountId]) {
        for account in accounts {
            self.sink.deliver(NotificationEvent {
                kind,
                exchange_id: exchange.clone(),
                account_id: (*account).clone(),
            });
        }
    }
}
