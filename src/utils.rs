//! Identifier minting: uuid7 for time-ordered uniqueness, bech32 for a
//! readable prefixed representation.

use bech32::Bech32m;
use uuid7::uuid7;

/// Prefix for account identifiers supplied by the auth collaborator.
pub const ACCOUNT_HRP: &str = "acct_";
/// Prefix for video asset identifiers.
pub const VIDEO_HRP: &str = "vid_";
/// Prefix for exchange identifiers.
pub const EXCHANGE_HRP: &str = "exch_";
/// Prefix for rating identifiers.
pub const RATING_HRP: &str = "rate_";

/// Construct a fresh uuid7 and encode it with the given human-readable prefix.
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
