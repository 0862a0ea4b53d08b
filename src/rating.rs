//! Rating Eligibility Gate value objects.
//!
//! A participant of an accepted exchange may rate the counterpart exactly
//! once, for the video they received. Rated user and video come from the
//! exchange's own references rather than the live ledger, since the ledger
//! may have moved on by the time a rating arrives.

use crate::error::ExchangeError;
use crate::exchange::{Exchange, ExchangeStatus};
use crate::types::{AccountId, ExchangeId, TimeStamp, VideoId};
use chrono::Utc;

pub const MIN_COMMENT_CHARS: usize = 10;
pub const MAX_COMMENT_CHARS: usize = 500;

/// A rating value on the [1.0, 5.0] scale in 0.5 increments, stored as
/// half-steps so persistence never touches floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
#[cbor(transparent)]
pub struct RatingValue(#[n(0)] u8);

impl RatingValue {
    pub fn new(value: f32) -> Result<Self, ExchangeError> {
        let doubled = value * 2.0;
        if !(1.0..=5.0).contains(&value) || doubled.trunc() != doubled {
            return Err(ExchangeError::Validation(format!(
                "rating value {value} must lie in [1.0, 5.0] in 0.5 steps"
            )));
        }
        Ok(Self(doubled as u8))
    }

    pub fn as_f32(&self) -> f32 {
        f32::from(self.0) / 2.0
    }

    pub fn half_steps(&self) -> u8 {
        self.0
    }
}

/// Normalise an optional comment: empty means absent, anything present must
/// be 10 to 500 characters.
pub fn normalize_comment(comment: Option<&str>) -> Result<Option<String>, ExchangeError> {
    match comment {
        None => Ok(None),
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => {
            let chars = text.chars().count();
            if !(MIN_COMMENT_CHARS..=MAX_COMMENT_CHARS).contains(&chars) {
                return Err(ExchangeError::Validation(format!(
                    "comment must be {MIN_COMMENT_CHARS} to {MAX_COMMENT_CHARS} characters, got {chars}"
                )));
            }
            Ok(Some(text.to_owned()))
        }
    }
}

/// One submitted rating. At most one exists per (exchange, author).
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Rating {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub exchange_id: ExchangeId,
    #[n(2)]
    pub author: AccountId,
    #[n(3)]
    pub rated_user: AccountId,
    /// The video the author received in the trade, not the one given away.
    #[n(4)]
    pub video: VideoId,
    #[n(5)]
    pub value: RatingValue,
    #[n(6)]
    pub comment: Option<String>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

impl Rating {
    /// Build a rating from an accepted exchange, deriving the rated
    /// counterpart and the delivered video. Input validation
    /// (`Validation`) is separate from eligibility (`NotEligible`).
    pub fn for_exchange(
        exchange: &Exchange,
        author: &AccountId,
        value: f32,
        comment: Option<&str>,
    ) -> Result<Self, ExchangeError> {
        let value = RatingValue::new(value)?;
        let comment = normalize_comment(comment)?;

        if exchange.status != ExchangeStatus::Accepted {
            return Err(ExchangeError::NotEligible(format!(
                "exchange {} is {}, only accepted exchanges can be rated",
                exchange.id, exchange.status
            )));
        }
        let rated_user = exchange.counterpart_of(author).ok_or_else(|| {
            ExchangeError::NotEligible(format!(
                "account {author} took no part in exchange {}",
                exchange.id
            ))
        })?;
        let video = exchange.video_received_by(author).ok_or_else(|| {
            ExchangeError::NotEligible(format!(
                "no delivered video recorded for {author} on exchange {}",
                exchange.id
            ))
        })?;

        Ok(Self {
            // the prefix is a compile-time constant and always a valid hrp
            id: crate::utils::new_uuid_to_bech32(crate::utils::RATING_HRP)
                .expect("static hrp is valid"),
            exchange_id: exchange.id.clone(),
            author: author.clone(),
            rated_user: rated_user.clone(),
            video: video.clone(),
            value,
            comment,
            created_at: TimeStamp::new(),
        })
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
    use crate::types::VideoId;

    fn accepted_exchange() -> Exchange {
        let mut exchange = Exchange::new(
            AccountId::generate(),
            AccountId::generate(),
            VideoId::generate(),
            None,
        )
        .unwrap();
        exchange.mark_accepted(VideoId::generate()).unwrap();
        exchange
    }

    #[test]
    fn half_step_values_are_accepted() {
        for half_steps in 2..=10u8 {
            let value = f32::from(half_steps) / 2.0;
            assert_eq!(RatingValue::new(value).unwrap().half_steps(), half_steps);
        }
    }

    #[test]
    fn off_grid_value_is_rejected() {
        assert!(matches!(
            RatingValue::new(2.3).unwrap_err(),
            ExchangeError::Validation(_)
        ));
        assert!(RatingValue::new(0.5).is_err());
        assert!(RatingValue::new(5.5).is_err());
        assert!(RatingValue::new(f32::NAN).is_err());
    }

    #[test]
    fn empty_comment_counts_as_absent() {
        assert_eq!(normalize_comment(None).unwrap(), None);
        assert_eq!(normalize_comment(Some("")).unwrap(), None);
    }

    #[test]
    fn short_comment_is_rejected() {
        assert!(matches!(
            normalize_comment(Some("meh..")).unwrap_err(),
            ExchangeError::Validation(_)
        ));
    }

    #[test]
    fn rating_derives_counterpart_and_delivered_video() {
        let exchange = accepted_exchange();

        let by_initiator =
            Rating::for_exchange(&exchange, &exchange.initiator, 4.5, None).unwrap();
        assert_eq!(by_initiator.rated_user, exchange.responder);
        assert_eq!(by_initiator.video, exchange.responder_video);

        let by_responder =
            Rating::for_exchange(&exchange, &exchange.responder, 3.0, None).unwrap();
        assert_eq!(by_responder.rated_user, exchange.initiator);
        assert_eq!(Some(&by_responder.video), exchange.initiator_video.as_ref());
    }

    #[test]
    fn pending_exchange_is_not_rateable() {
        let exchange = Exchange::new(
            AccountId::generate(),
            AccountId::generate(),
            VideoId::generate(),
            None,
        )
        .unwrap();

        let err =
            Rating::for_exchange(&exchange, &exchange.initiator, 4.0, None).unwrap_err();
        assert!(matches!(err, ExchangeError::NotEligible(_)));
    }

    #[test]
    fn strangers_are_not_eligible() {
        let exchange = accepted_exchange();
        let stranger = AccountId::generate();

        let err = Rating::for_exchange(&exchange, &stranger, 4.0, None).unwrap_err();
        assert!(matches!(err, ExchangeError::NotEligible(_)));
    }
}
