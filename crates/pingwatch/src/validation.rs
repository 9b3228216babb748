//! Endpoint configuration validation.
//!
//! Addresses must be dotted-quad IPv4 literals. No trimming is applied, so
//! leading or trailing whitespace makes an address invalid just like
//! embedded whitespace does.

use std::net::Ipv4Addr;

use crate::error::ValidationError;
use crate::target::PollInterval;

/// Returns true when `address` is a well-formed dotted-quad IPv4 literal
pub fn validate(address: &str) -> bool {
    parse_address(address).is_ok()
}

/// Parse an IPv4 literal, rejecting hostnames, IPv6 and short forms
pub fn parse_address(address: &str) -> Result<Ipv4Addr, ValidationError> {
    // The std parser already refuses short forms like "10.1" and octets with
    // leading zeros; the segment count check keeps that explicit.
    if address.split('.').count() != 4 {
        return Err(ValidationError::InvalidAddress { value: address.to_string() });
    }

    address
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::InvalidAddress { value: address.to_string() })
}

/// Parse a poll interval as entered by a user, e.g. from a text field
pub fn parse_interval(raw: &str) -> Result<PollInterval, ValidationError> {
    let seconds: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::IntervalNotANumber { value: raw.to_string() })?;

    if seconds < 1 {
        return Err(ValidationError::IntervalTooSmall { value: seconds });
    }

    PollInterval::from_secs(seconds as u64)
}
