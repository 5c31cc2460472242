// Booking amounts: package pricing and due/payment-status derivation

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partially_paid" => Ok(PaymentStatus::PartiallyPaid),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(AppError::Internal(format!(
                "Unknown payment status in store: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
    pub payment_status: PaymentStatus,
}

// Derive due amount and payment status. Overpayment is tolerated here so
// that administrative edits can record it; the public flow calls
// `validate_advance_payment` instead.
pub fn compute(total_amount: Decimal, paid_amount: Decimal) -> Result<Ledger> {
    if total_amount.is_sign_negative() || paid_amount.is_sign_negative() {
        return Err(AppError::InvalidAmount(
            "Amounts must not be negative".to_string(),
        ));
    }

    let payment_status = if paid_amount >= total_amount {
        PaymentStatus::Paid
    } else if paid_amount > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    };

    Ok(Ledger {
        total_amount,
        paid_amount,
        due_amount: total_amount - paid_amount,
        payment_status,
    })
}

// Entry policy for public bookings: `minimum <= paid <= total`.
pub fn validate_advance_payment(
    total_amount: Decimal,
    paid_amount: Decimal,
    minimum: Decimal,
) -> Result<Ledger> {
    if paid_amount < minimum || paid_amount > total_amount {
        return Err(AppError::InvalidAmount(format!(
            "Payment amount must be between {} and {}",
            minimum.normalize(),
            total_amount.normalize()
        )));
    }
    compute(total_amount, paid_amount)
}

#[derive(Debug, Clone)]
pub struct PackageCatalog {
    prices: Arc<BTreeMap<String, Decimal>>,
}

impl PackageCatalog {
    pub fn new(prices: BTreeMap<String, Decimal>) -> Self {
        Self {
            prices: Arc::new(prices),
        }
    }

    // Parse `Name=price,Name=price`.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let mut prices = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, price) = entry
                .split_once('=')
                .ok_or_else(|| format!("Package entry '{entry}' is not NAME=PRICE"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("Package entry '{entry}' has an empty name"));
            }
            let price = Decimal::from_str(price.trim())
                .map_err(|e| format!("Package '{name}' has an invalid price: {e}"))?;
            if price.is_sign_negative() {
                return Err(format!("Package '{name}' has a negative price"));
            }
            if prices.insert(name.to_string(), price).is_some() {
                return Err(format!("Package '{name}' is listed twice"));
            }
        }
        if prices.is_empty() {
            return Err("At least one package must be configured".to_string());
        }
        Ok(Self::new(prices))
    }

    pub fn price_of(&self, package: &str) -> Option<Decimal> {
        self.prices.get(package).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }
}

impl Default for PackageCatalog {
    fn default() -> Self {
        let mut prices = BTreeMap::new();
        prices.insert("Basic".to_string(), Decimal::from(3000));
        prices.insert("Standard".to_string(), Decimal::from(6000));
        prices.insert("Premium".to_string(), Decimal::from(10000));
        Self::new(prices)
    }
}
