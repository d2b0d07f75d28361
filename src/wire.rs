//! String mapping for statuses and conditions exchanged with collaborators
//!
//! Inside the core these are closed enums; text only appears here, at the
//! adapter boundary.
use crate::error::MarketError;
use crate::offer::{Condition, OfferStatus};
use crate::trade::TradeStatus;
use std::fmt;
use std::str::FromStr;

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Draft => "draft",
            OfferStatus::Published => "published",
            OfferStatus::Paused => "paused",
            OfferStatus::Completed => "completed",
        }
    }
}

impl FromStr for OfferStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(OfferStatus::Draft),
            "published" => Ok(OfferStatus::Published),
            "paused" => Ok(OfferStatus::Paused),
            "completed" => Ok(OfferStatus::Completed),
            other => Err(MarketError::Validation(format!(
                "unknown offer status '{other}'"
            ))),
        }
    }
}

impl TradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Completed => "completed",
            TradeStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TradeStatus::Pending),
            "accepted" => Ok(TradeStatus::Accepted),
            "rejected" => Ok(TradeStatus::Rejected),
            "completed" => Ok(TradeStatus::Completed),
            // backends disagree on the spelling
            "cancelled" | "canceled" => Ok(TradeStatus::Cancelled),
            other => Err(MarketError::Validation(format!(
                "unknown trade status '{other}'"
            ))),
        }
    }
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
        }
    }

    /// Label shown in the Spanish storefront.
    pub fn label_es(self) -> &'static str {
        match self {
            Condition::New => "Nuevo",
            Condition::Excellent => "Excelente",
            Condition::Good => "Bueno",
            Condition::Fair => "Regular",
        }
    }
}

impl FromStr for Condition {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" | "nuevo" => Ok(Condition::New),
            "excellent" | "excelente" => Ok(Condition::Excellent),
            "good" | "bueno" => Ok(Condition::Good),
            "fair" | "regular" => Ok(Condition::Fair),
            other => Err(MarketError::Validation(format!(
                "unknown condition '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storefront_labels() {
        assert_eq!("Excelente".parse::<Condition>().unwrap(), Condition::Excellent);
        assert_eq!("Bueno".parse::<Condition>().unwrap(), Condition::Good);
        assert_eq!(" fair ".parse::<Condition>().unwrap(), Condition::Fair);
        assert!("mint".parse::<Condition>().is_err());
    }

    #[test]
    fn parses_statuses() {
        assert_eq!("PUBLISHED".parse::<OfferStatus>().unwrap(), OfferStatus::Published);
        assert_eq!("canceled".parse::<TradeStatus>().unwrap(), TradeStatus::Cancelled);
        assert_eq!(TradeStatus::Accepted.to_string(), "accepted");
        assert!("open".parse::<TradeStatus>().is_err());
    }
}
