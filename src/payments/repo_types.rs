use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` are final.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount must have at most two decimal places")]
    TooPrecise,
    #[error("amount is not a number")]
    NotANumber,
}

/// Positive money amount with two decimal places, held in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount {
    cents: u64,
}

impl Amount {
    pub fn from_cents(cents: u64) -> Result<Self, AmountError> {
        if cents == 0 {
            return Err(AmountError::NotPositive);
        }
        Ok(Self { cents })
    }

    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotANumber);
        }
        if value <= 0.0 {
            return Err(AmountError::NotPositive);
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(AmountError::TooPrecise);
        }
        if rounded > u64::MAX as f64 {
            return Err(AmountError::NotANumber);
        }
        Self::from_cents(rounded as u64)
    }

    #[cfg(test)]
    pub fn cents(self) -> u64 {
        self.cents
    }

    pub fn as_f64(self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl std::str::FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !digits(whole) || !digits(frac) {
            return Err(AmountError::NotANumber);
        }
        if frac.len() > 2 {
            return Err(AmountError::TooPrecise);
        }
        let whole: u64 = whole.parse().map_err(|_| AmountError::NotANumber)?;
        let frac: u64 = format!("{frac:0<2}").parse().map_err(|_| AmountError::NotANumber)?;
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .ok_or(AmountError::NotANumber)?;
        Self::from_cents(cents)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Amount::from_f64(n),
            Raw::Text(s) => s.parse(),
        }
        .map_err(de::Error::custom)
    }
}

/// Purchase record in the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipe_id: String,
    pub amount: Amount,
    pub transaction_id: String, // payment provider tx_ref
    pub status: PurchaseStatus,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub recipe_id: String,
    pub amount: Amount,
    pub transaction_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_two_decimals() {
        let a: Amount = "25".parse().unwrap();
        assert_eq!(a.to_string(), "25.00");
        let b: Amount = "25.5".parse().unwrap();
        assert_eq!(b.cents(), 2550);
        assert_eq!(Amount::from_f64(25.0).unwrap().to_string(), "25.00");
        assert_eq!(Amount::from_f64(0.1).unwrap().cents(), 10);
    }

    #[test]
    fn rejects_non_positive_and_too_precise() {
        assert_eq!(Amount::from_f64(0.0), Err(AmountError::NotPositive));
        assert_eq!(Amount::from_f64(-3.0), Err(AmountError::NotPositive));
        assert_eq!(Amount::from_f64(1.234), Err(AmountError::TooPrecise));
        assert_eq!("1.234".parse::<Amount>(), Err(AmountError::TooPrecise));
        assert_eq!("-1".parse::<Amount>(), Err(AmountError::NotANumber));
        assert_eq!("0.00".parse::<Amount>(), Err(AmountError::NotPositive));
    }

    #[test]
    fn deserializes_from_number_or_string() {
        let n: Amount = serde_json::from_str("25.00").unwrap();
        let s: Amount = serde_json::from_str("\"25.00\"").unwrap();
        assert_eq!(n, s);
        assert!(serde_json::from_str::<Amount>("0").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!PurchaseStatus::Pending.is_terminal());
        assert!(PurchaseStatus::Completed.is_terminal());
        assert!(PurchaseStatus::Failed.is_terminal());
        assert_eq!(PurchaseStatus::Completed.as_str(), "completed");
    }
}
