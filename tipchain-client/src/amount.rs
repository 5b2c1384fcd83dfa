//! Amount Conversion
//!
//! Converts between human-entered display amounts ("1.5") and the ledger's
//! minimal integer unit. Conversion is done on the decimal string directly,
//! never through floating point, and always truncates extra fractional
//! digits so a user is never charged more than they typed.

use crate::error::{Error, Result};

/// Number of fractional digits in the display unit
pub const DEFAULT_DECIMALS: u32 = 6;

/// Minimal units per display unit (10^6)
pub const MINIMAL_PER_DISPLAY: u128 = 1_000_000;

/// Converts display amounts to minimal units and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountCodec {
    decimals: u32,
    display_denom: String,
    minimal_denom: String,
}

impl Default for AmountCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DECIMALS, "XION", "uxion")
    }
}

impl AmountCodec {
    /// Create a codec for a denomination pair
    pub fn new(decimals: u32, display_denom: &str, minimal_denom: &str) -> Self {
        Self {
            decimals,
            display_denom: display_denom.to_string(),
            minimal_denom: minimal_denom.to_string(),
        }
    }

    /// Minimal unit denomination (e.g. `uxion`)
    pub fn minimal_denom(&self) -> &str {
        &self.minimal_denom
    }

    /// Display denomination (e.g. `XION`)
    pub fn display_denom(&self) -> &str {
        &self.display_denom
    }

    fn scale(&self) -> u128 {
        10u128.pow(self.decimals)
    }

    /// Parse a display amount into minimal units, truncating any digits
    /// beyond the unit's precision.
    ///
    /// Accepts plain decimal notation with an optional trailing display
    /// denomination ("2.5", "2.5 XION", ".5"). Negative, empty, exponent
    /// or otherwise non-numeric input is rejected.
    pub fn to_minimal(&self, display: &str) -> Result<u128> {
        let trimmed = display.trim();
        let trimmed = trimmed
            .strip_suffix(self.display_denom.as_str())
            .unwrap_or(trimmed)
            .trim_end();

        if trimmed.is_empty() {
            return Err(Error::InvalidAmount("amount is empty".to_string()));
        }
        if trimmed.starts_with('-') {
            return Err(Error::InvalidAmount(format!(
                "amount cannot be negative: {}",
                trimmed
            )));
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(Error::InvalidAmount(format!("not a number: {}", trimmed)));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::InvalidAmount(format!("not a number: {}", trimmed)));
        }

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| Error::InvalidAmount(format!("amount too large: {}", trimmed)))?
        };

        // Truncate, then right-pad to the unit's precision
        let decimals = self.decimals as usize;
        let kept: String = fraction.chars().take(decimals).collect();
        let padded = format!("{:0<width$}", kept, width = decimals);
        let fraction_value: u128 = if padded.is_empty() {
            0
        } else {
            padded
                .parse()
                .map_err(|_| Error::InvalidAmount(format!("not a number: {}", trimmed)))?
        };

        whole_value
            .checked_mul(self.scale())
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(|| Error::InvalidAmount(format!("amount too large: {}", trimmed)))
    }

    /// Exact display string for a minimal amount, without trailing zeros
    /// ("1500000" -> "1.5", "5000000" -> "5").
    pub fn to_display(&self, minimal: u128) -> String {
        let scale = self.scale();
        let whole = minimal / scale;
        let fraction = minimal % scale;

        if fraction == 0 {
            return whole.to_string();
        }

        let digits = format!("{:0width$}", fraction, width = self.decimals as usize);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }

    /// Parse a ledger-reported minimal amount ("12345") and render it for
    /// display. Negative or fractional input is rejected.
    pub fn minimal_str_to_display(&self, minimal: &str) -> Result<String> {
        Ok(self.to_display(parse_minimal(minimal)?))
    }

    /// Fixed-precision amount with denomination ("1.500000 XION")
    pub fn format(&self, minimal: u128) -> String {
        let scale = self.scale();
        format!(
            "{}.{:0width$} {}",
            minimal / scale,
            minimal % scale,
            self.display_denom,
            width = self.decimals as usize
        )
    }

    /// Coin string as stored by the registry ("5000000uxion")
    pub fn coin_string(&self, minimal: u128) -> String {
        format!("{}{}", minimal, self.minimal_denom)
    }

    /// Parse a registry coin string ("5000000uxion") into minimal units.
    ///
    /// A bare integer is accepted as well; any other denomination is an
    /// error.
    pub fn parse_coin_string(&self, coin: &str) -> Result<u128> {
        let coin = coin.trim();
        let digits_end = coin
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(coin.len());
        let (digits, denom) = coin.split_at(digits_end);

        if !denom.is_empty() && denom != self.minimal_denom {
            return Err(Error::InvalidAmount(format!(
                "unexpected denomination '{}' (expected {})",
                denom, self.minimal_denom
            )));
        }
        parse_minimal(digits)
    }
}

/// Parse an integer minimal-unit amount
pub fn parse_minimal(minimal: &str) -> Result<u128> {
    let minimal = minimal.trim();
    if minimal.is_empty() || !minimal.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidAmount(format!(
            "minimal amount must be a non-negative integer: {}",
            minimal
        )));
    }
    minimal
        .parse()
        .map_err(|_| Error::InvalidAmount(format!("amount too large: {}", minimal)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minimal_whole_and_fractional() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_minimal("1").unwrap(), 1_000_000);
        assert_eq!(codec.to_minimal("0.5").unwrap(), 500_000);
        assert_eq!(codec.to_minimal(".25").unwrap(), 250_000);
        assert_eq!(codec.to_minimal("3.").unwrap(), 3_000_000);
        assert_eq!(codec.to_minimal("0.000001").unwrap(), 1);
    }

    #[test]
    fn test_to_minimal_truncates_never_rounds_up() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_minimal("0.0000019").unwrap(), 1);
        assert_eq!(codec.to_minimal("1.9999999").unwrap(), 1_999_999);
        assert_eq!(codec.to_minimal("0.0000009").unwrap(), 0);
    }

    #[test]
    fn test_to_minimal_with_suffix() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_minimal("2.5 XION").unwrap(), 2_500_000);
        assert_eq!(codec.to_minimal("  7XION ").unwrap(), 7_000_000);
    }

    #[test]
    fn test_to_minimal_rejects_invalid() {
        let codec = AmountCodec::default();
        for input in ["", "abc", "-1", "1e3", "1.2.3", ".", "NaN", "inf", "1,5"] {
            assert!(
                matches!(codec.to_minimal(input), Err(Error::InvalidAmount(_))),
                "expected rejection for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_to_display_exact() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_display(0), "0");
        assert_eq!(codec.to_display(1), "0.000001");
        assert_eq!(codec.to_display(1_500_000), "1.5");
        assert_eq!(codec.to_display(5_000_000), "5");
        assert_eq!(codec.to_display(123_456_789), "123.456789");
    }

    #[test]
    fn test_display_of_minimal_is_truncated_input() {
        let codec = AmountCodec::default();
        let cases = [
            ("1.5", "1.5"),
            ("10", "10"),
            ("0.1234567", "0.123456"),
            ("42.0000009", "42"),
        ];
        for (input, expected) in cases {
            let minimal = codec.to_minimal(input).unwrap();
            assert_eq!(codec.to_display(minimal), expected);
        }
    }

    #[test]
    fn test_minimal_str_rejects_negative_and_fractional() {
        let codec = AmountCodec::default();
        assert_eq!(codec.minimal_str_to_display("2500000").unwrap(), "2.5");
        assert!(codec.minimal_str_to_display("-5").is_err());
        assert!(codec.minimal_str_to_display("1.5").is_err());
    }

    #[test]
    fn test_format_and_coin_strings() {
        let codec = AmountCodec::default();
        assert_eq!(codec.format(1_500_000), "1.500000 XION");
        assert_eq!(codec.coin_string(5_000_000), "5000000uxion");
        assert_eq!(codec.parse_coin_string("5000000uxion").unwrap(), 5_000_000);
        assert_eq!(codec.parse_coin_string("42").unwrap(), 42);
        assert!(codec.parse_coin_string("5atom").is_err());
    }
}
