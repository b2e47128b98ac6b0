//! Invoice line-item arithmetic.
//!
//! Two formulas are in use. The invoice editor applies discount and tax;
//! quick invoices and items added straight from a service catalog bill
//! `price × quantity` only. Markup is stored with each line but is not part
//! of either total.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMode {
    Full,
    Simple,
}

impl CalculationMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            CalculationMode::Full => "full",
            CalculationMode::Simple => "simple",
        }
    }

    /// Stored modes other than `simple` are treated as the editor formula.
    pub fn from_stored(value: &str) -> Self {
        if value == "simple" {
            CalculationMode::Simple
        } else {
            CalculationMode::Full
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItemAmounts {
    pub quantity: f64,
    pub price: f64,
    #[serde(default)]
    pub discount_percent: f64,
    #[serde(default)]
    pub tax_percent: f64,
    #[serde(default)]
    pub markup_percent: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalculationError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("{field} must be between 0 and 100")]
    PercentOutOfRange { field: &'static str },
}

impl From<CalculationError> for AppError {
    fn from(value: CalculationError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl LineItemAmounts {
    pub fn validate(&self) -> Result<(), CalculationError> {
        let fields = [
            ("quantity", self.quantity),
            ("price", self.price),
            ("discount_percent", self.discount_percent),
            ("tax_percent", self.tax_percent),
            ("markup_percent", self.markup_percent),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(CalculationError::NotFinite { field });
            }
            if value < 0.0 {
                return Err(CalculationError::Negative { field });
            }
        }
        for (field, value) in [
            ("discount_percent", self.discount_percent),
            ("tax_percent", self.tax_percent),
        ] {
            if value > 100.0 {
                return Err(CalculationError::PercentOutOfRange { field });
            }
        }
        Ok(())
    }

    pub fn gross(&self) -> f64 {
        self.price * self.quantity
    }

    pub fn total(&self, mode: CalculationMode) -> f64 {
        match mode {
            CalculationMode::Simple => round_cents(self.gross()),
            CalculationMode::Full => round_cents(
                self.gross() * (1.0 - self.discount_percent / 100.0)
                    * (1.0 + self.tax_percent / 100.0),
            ),
        }
    }

    fn breakdown(&self, mode: CalculationMode) -> LineBreakdown {
        let gross = self.gross();
        match mode {
            CalculationMode::Simple => LineBreakdown {
                gross,
                discount: 0.0,
                tax: 0.0,
            },
            CalculationMode::Full => {
                let discount = gross * self.discount_percent / 100.0;
                let tax = (gross - discount) * self.tax_percent / 100.0;
                LineBreakdown {
                    gross,
                    discount,
                    tax,
                }
            }
        }
    }
}

struct LineBreakdown {
    gross: f64,
    discount: f64,
    tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub discount_total: f64,
    pub tax_total: f64,
    pub total: f64,
}

impl InvoiceTotals {
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = (&'a LineItemAmounts, CalculationMode)>,
    {
        let mut subtotal = 0.0;
        let mut discount_total = 0.0;
        let mut tax_total = 0.0;
        let mut total = 0.0;
        for (item, mode) in items {
            let parts = item.breakdown(mode);
            subtotal += parts.gross;
            discount_total += parts.discount;
            tax_total += parts.tax;
            total += item.total(mode);
        }
        Self {
            subtotal: round_cents(subtotal),
            discount_total: round_cents(discount_total),
            tax_total: round_cents(tax_total),
            total: round_cents(total),
        }
    }
}
