//! Exchange Record and its status state machine.
//!
//! An exchange starts `Pending` and resolves to exactly one of `Accepted` or
//! `Rejected`; both are terminal and immutable. Cancellation by the initiator
//! is a rejection. Ownership side effects of acceptance live in
//! [`crate::service`], which applies them atomically with the status flip.

use crate::error::ExchangeError;
use crate::types::{AccountId, ExchangeId, TimeStamp, VideoId};
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ExchangeStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
}

impl ExchangeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeStatus::Pending)
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Accepted => "accepted",
            ExchangeStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// One proposed trade: the initiator requests access to the responder's
/// video and surrenders one of their own in return.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Exchange {
    #[n(0)]
    pub id: ExchangeId,
    #[n(1)]
    pub initiator: AccountId,
    #[n(2)]
    pub responder: AccountId,
    /// The asset the initiator gives away. May be fixed at proposal time or
    /// supplied when the responder accepts.
    #[n(3)]
    pub initiator_video: Option<VideoId>,
    /// The asset the responder offers to trade away; fixed at creation.
    #[n(4)]
    pub responder_video: VideoId,
    #[n(5)]
    pub status: ExchangeStatus,
    #[n(6)]
    pub requested_date: TimeStamp<Utc>,
}

impl Exchange {
    pub fn new(
        initiator: AccountId,
        responder: AccountId,
        responder_video: VideoId,
        initiator_video: Option<VideoId>,
    ) -> Result<Self, ExchangeError> {
        if initiator == responder {
            return Err(ExchangeError::Validation(
                "an exchange needs two distinct accounts".into(),
            ));
        }
        if initiator_video.as_ref() == Some(&responder_video) {
            return Err(ExchangeError::Validation(
                "both sides of an exchange cannot be the same video".into(),
            ));
        }

        Ok(Self {
            id: ExchangeId::generate(),
            initiator,
            responder,
            initiator_video,
            responder_video,
            status: ExchangeStatus::Pending,
            requested_date: TimeStamp::new(),
        })
    }

    pub fn is_party(&self, account: &AccountId) -> bool {
        &self.initiator == account || &self.responder == account
    }

    /// The other participant, if `account` is a participant at all.
    pub fn counterpart_of(&self, account: &AccountId) -> Option<&AccountId> {
        if account == &self.initiator {
            Some(&self.responder)
        } else if account == &self.responder {
            Some(&self.initiator)
        } else {
            None
        }
    }

    /// The video `account` gained in this trade, per the exchange's own
    /// references. Deliberately not a ledger lookup: by the time anyone asks,
    /// the ledger may have moved on further.
    pub fn video_received_by(&self, account: &AccountId) -> Option<&VideoId> {
        if account == &self.initiator {
            Some(&self.responder_video)
        } else if account == &self.responder {
            self.initiator_video.as_ref()
        } else {
            None
        }
    }

    fn ensure_pending(&self, action: &str) -> Result<(), ExchangeError> {
        if self.status.is_terminal() {
            return Err(ExchangeError::InvalidTransition {
                exchange: self.id.to_string(),
                status: format!("{} (cannot {action})", self.status),
            });
        }
        Ok(())
    }

    /// `pending -> accepted`, fixing the initiator's surrendered video.
    /// Ownership preconditions are checked by the caller against the ledger.
    pub fn mark_accepted(&mut self, initiator_video: VideoId) -> Result<(), ExchangeError> {
        self.ensure_pending("accept")?;

        if initiator_video == self.responder_video {
            return Err(ExchangeError::Validation(
                "both sides of an exchange cannot be the same video".into(),
            ));
        }
        if let Some(fixed) = &self.initiator_video
            && fixed != &initiator_video
        {
            return Err(ExchangeError::Validation(format!(
                "exchange {} already offers initiator video {fixed}",
                self.id
            )));
        }

        self.initiator_video = Some(initiator_video);
        self.status = ExchangeStatus::Accepted;
        Ok(())
    }

    /// `pending -> rejected`. Covers both the responder declining and the
    /// initiator cancelling.
    pub fn mark_rejected(&mut self, acting: &AccountId) -> Result<(), ExchangeError> {
        if !self.is_party(acting) {
            return Err(ExchangeError::Validation(format!(
                "account {acting} has no standing on exchange {}",
                self.id
            )));
        }
        self.ensure_pending("reject")?;

        self.status = ExchangeStatus::Rejected;
        Ok(())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, ExchangeError> {
        Ok(minicbor::to_vec(self)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, ExchangeError> {
        Ok(minicbor::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_exchange() -> Exchange {
        Exchange::new(
            AccountId::generate(),
            AccountId::generate(),
            VideoId::generate(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn new_exchange_rejects_self_trade() {
        let account = AccountId::generate();
        let err = Exchange::new(account.clone(), account, VideoId::generate(), None).unwrap_err();

        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[test]
    fn new_exchange_rejects_same_video_on_both_sides() {
        let video = VideoId::generate();
        let err = Exchange::new(
            AccountId::generate(),
            AccountId::generate(),
            video.clone(),
            Some(video),
        )
        .unwrap_err();

        assert!(matches!(err, ExchangeError::Validation(_)));
    }

    #[test]
    fn accept_fixes_initiator_video_and_is_terminal() {
        let mut exchange = pending_exchange();
        let offered = VideoId::generate();

        exchange.mark_accepted(offered.clone()).unwrap();
        assert_eq!(exchange.status, ExchangeStatus::Accepted);
        assert_eq!(exchange.initiator_video, Some(offered.clone()));

        // terminal states never transition again
        let err = exchange.mark_accepted(offered).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidTransition { .. }));
        let responder = exchange.responder.clone();
        let err = exchange.mark_rejected(&responder).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidTransition { .. }));
    }

    #[test]
    fn accept_cannot_swap_a_video_for_itself() {
        let mut exchange = pending_exchange();
        let same = exchange.responder_video.clone();

        let err = exchange.mark_accepted(same).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        assert_eq!(exchange.status, ExchangeStatus::Pending);
    }

    #[test]
    fn accept_cannot_silently_replace_a_fixed_offer() {
        let initiator = AccountId::generate();
        let fixed = VideoId::generate();
        let mut exchange = Exchange::new(
            initiator,
            AccountId::generate(),
            VideoId::generate(),
            Some(fixed),
        )
        .unwrap();

        let err = exchange.mark_accepted(VideoId::generate()).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        assert_eq!(exchange.status, ExchangeStatus::Pending);
    }

    #[test]
    fn reject_requires_a_participant() {
        let mut exchange = pending_exchange();
        let stranger = AccountId::generate();

        let err = exchange.mark_rejected(&stranger).unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));

        let initiator = exchange.initiator.clone();
        exchange.mark_rejected(&initiator).unwrap();
        assert_eq!(exchange.status, ExchangeStatus::Rejected);
    }

    #[test]
    fn received_video_uses_pre_transfer_references() {
        let mut exchange = pending_exchange();
        let offered = VideoId::generate();
        exchange.mark_accepted(offered.clone()).unwrap();

        assert_eq!(
            exchange.video_received_by(&exchange.initiator),
            Some(&exchange.responder_video)
        );
        assert_eq!(exchange.video_received_by(&exchange.responder), Some(&offered));
        assert_eq!(exchange.video_received_by(&AccountId::generate()), None);
    }

    #[test]
    fn exchange_cbor_roundtrip() {
        let exchange = pending_exchange();

        let encoded = exchange.encode().unwrap();
        let decoded = Exchange::decode(&encoded).unwrap();

        assert_eq!(exchange, decoded);
    }
}
