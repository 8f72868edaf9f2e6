//! Replaceable pricing rules applied at checkout.
//!
//! Each rule is a pure function of its inputs. [`Pricing`] bundles one of
//! each and produces the breakdown stored on the order; the order never
//! recomputes it afterwards. Rules return `None` when an amount overflows.

use std::{fmt, sync::Arc};

use rust_decimal::Decimal;

use crate::{config::PricingConfig, models::CartItem};

pub trait ShippingRule: fmt::Debug + Send + Sync {
    fn shipping_fee(&self, items: &[CartItem], discount_eligible: bool) -> Option<Decimal>;
}

pub trait TaxRule: fmt::Debug + Send + Sync {
    fn tax(&self, subtotal: Decimal) -> Option<Decimal>;
}

pub trait DiscountRule: fmt::Debug + Send + Sync {
    fn discount(&self, subtotal: Decimal) -> Option<Decimal>;
}

/// Flat fee, reduced by `promo` for discount-eligible checkouts.
#[derive(Debug, Clone)]
pub struct FlatShippingFee {
    pub base: Decimal,
    pub promo: Decimal,
}

impl ShippingRule for FlatShippingFee {
    fn shipping_fee(&self, _items: &[CartItem], discount_eligible: bool) -> Option<Decimal> {
        if discount_eligible {
            self.base.checked_sub(self.promo)
        } else {
            Some(self.base)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PercentageTax {
    pub rate: Decimal,
}

impl TaxRule for PercentageTax {
    fn tax(&self, subtotal: Decimal) -> Option<Decimal> {
        self.rate.checked_mul(subtotal)
    }
}

#[derive(Debug, Clone)]
pub struct PercentageDiscount {
    pub rate: Decimal,
}

impl DiscountRule for PercentageDiscount {
    fn discount(&self, subtotal: Decimal) -> Option<Decimal> {
        self.rate.checked_mul(subtotal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct Pricing {
    shipping: Arc<dyn ShippingRule>,
    tax: Arc<dyn TaxRule>,
    discount: Arc<dyn DiscountRule>,
    promo_enabled: bool,
    currency: String,
}

impl Pricing {
    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            shipping: Arc::new(FlatShippingFee {
                base: config.shipping_base_fee,
                promo: config.shipping_promo,
            }),
            tax: Arc::new(PercentageTax {
                rate: config.tax_rate,
            }),
            discount: Arc::new(PercentageDiscount {
                rate: config.discount_rate,
            }),
            promo_enabled: config.shipping_promo_enabled,
            currency: config.currency.clone(),
        }
    }

    pub fn with_shipping(mut self, rule: impl ShippingRule + 'static) -> Self {
        self.shipping = Arc::new(rule);
        self
    }

    pub fn with_tax(mut self, rule: impl TaxRule + 'static) -> Self {
        self.tax = Arc::new(rule);
        self
    }

    pub fn with_discount(mut self, rule: impl DiscountRule + 'static) -> Self {
        self.discount = Arc::new(rule);
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// `total = subtotal + shipping_fee + tax - discount`. Rule outputs below
    /// zero are clamped to zero. `None` when any step overflows.
    pub fn quote(&self, items: &[CartItem], subtotal: Decimal) -> Option<PriceBreakdown> {
        let shipping_fee = self
            .shipping
            .shipping_fee(items, self.promo_enabled)?
            .max(Decimal::ZERO);
        let tax = self.tax.tax(subtotal)?.max(Decimal::ZERO);
        let discount = self.discount.discount(subtotal)?.max(Decimal::ZERO);
        let total = subtotal
            .checked_add(shipping_fee)?
            .checked_add(tax)?
            .checked_sub(discount)?;

        Some(PriceBreakdown {
            subtotal,
            shipping_fee,
            tax,
            discount,
            total,
        })
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::from_config(&PricingConfig::default())
    }
}
