use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use super::{Currency, Expense};

/// Longest title, in characters, that every backend stores unchanged.
pub const MAX_TITLE_CHARS: usize = 255;
/// Most fractional digits a price may carry.
pub const MAX_PRICE_SCALE: u32 = 10;
/// Most integer digits a price may carry.
pub const MAX_PRICE_INTEGER_DIGITS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title should not be empty")]
    EmptyTitle,
    #[error("title must be at most {max} characters")]
    TitleTooLong { max: usize },
    #[error("price must be greater than 0")]
    NonPositivePrice,
    #[error("price must not be negative")]
    NegativePrice,
    #[error("price must have at most 18 integer digits and 10 decimal places")]
    PriceOutOfRange,
    #[error("currency must be one of: USD,EUR,GBP,MDL (got {0:?})")]
    UnknownCurrency(String),
    #[error("invalid value: {value} for param: {name}")]
    InvalidPageParam { name: &'static str, value: u32 },
    #[error("at least one id is required")]
    EmptyIdList,
}

fn check_title(title: &str) -> Result<(), ValidationError> {
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong { max: MAX_TITLE_CHARS });
    }
    Ok(())
}

/// Returns the price without trailing zeros, or an error if it does not fit
/// the precision both backends store exactly.
fn check_price(price: Decimal) -> Result<Decimal, ValidationError> {
    let price = price.normalize();
    let limit = Decimal::from_i128_with_scale(10i128.pow(MAX_PRICE_INTEGER_DIGITS), 0);
    if price.scale() > MAX_PRICE_SCALE || price.abs() >= limit {
        return Err(ValidationError::PriceOutOfRange);
    }
    Ok(price)
}

/// A validated create payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub title: String,
    pub price: Decimal,
    pub currency: Currency,
}

/// A partial update. `None`, a blank title or a non-positive price all mean
/// "leave this field alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseUpdate {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<Currency>,
}

impl ExpenseUpdate {
    pub fn is_empty(&self) -> bool {
        self.requested_title().is_none() && self.requested_price().is_none() && self.currency.is_none()
    }

    fn requested_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn requested_price(&self) -> Option<Decimal> {
        self.price.filter(|p| *p > Decimal::ZERO)
    }

    /// Applies the requested changes to `expense` and returns whether anything
    /// changed. `modified_at` is only touched when it returns `true`, and never
    /// moves before `created_at`.
    pub fn apply_to(&self, expense: &mut Expense, now: OffsetDateTime) -> bool {
        let mut dirty = false;

        if let Some(title) = self.requested_title() {
            if title != expense.title {
                expense.title = title.to_string();
                dirty = true;
            }
        }
        if let Some(price) = self.requested_price() {
            if price != expense.price {
                expense.price = price.normalize();
                dirty = true;
            }
        }
        if let Some(currency) = self.currency {
            if currency != expense.currency {
                expense.currency = currency;
                dirty = true;
            }
        }

        if dirty {
            expense.modified_at = now.max(expense.created_at);
        }
        dirty
    }
}

/// Raw create payload as received from a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateExpenseRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub currency: String,
}

impl CreateExpenseRequest {
    pub fn validate(&self) -> Result<NewExpense, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        check_title(title)?;
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice);
        }
        let price = check_price(self.price)?;
        let currency = self.currency.parse::<Currency>()?;
        Ok(NewExpense {
            title: title.to_string(),
            price,
            currency,
        })
    }
}

/// Raw update payload as received from a client; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExpenseRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl UpdateExpenseRequest {
    pub fn validate(&self) -> Result<ExpenseUpdate, ValidationError> {
        if matches!(self.price, Some(p) if p < Decimal::ZERO) {
            return Err(ValidationError::NegativePrice);
        }
        let currency = match self.currency.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(c) => Some(c.parse::<Currency>()?),
        };
        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        if let Some(ref title) = title {
            check_title(title)?;
        }
        let price = match self.price.filter(|p| *p > Decimal::ZERO) {
            Some(p) => Some(check_price(p)?),
            None => None,
        };
        Ok(ExpenseUpdate { title, price, currency })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::Duration;

    fn sample(now: OffsetDateTime) -> Expense {
        Expense {
            id: "0b1f1c3e-0000-3000-8000-000000000001".to_string(),
            title: "Lunch".to_string(),
            price: dec!(12.50),
            currency: Currency::Eur,
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateExpenseRequest {
            title: "  Coffee ".to_string(),
            price: dec!(3.2),
            currency: "usd".to_string(),
        };
        let new = ok.validate().unwrap();
        assert_eq!(new.title, "Coffee");
        assert_eq!(new.currency, Currency::Usd);

        let mut bad = ok.clone();
        bad.title = "   ".to_string();
        assert_eq!(bad.validate(), Err(ValidationError::EmptyTitle));

        let mut bad = ok.clone();
        bad.price = Decimal::ZERO;
        assert_eq!(bad.validate(), Err(ValidationError::NonPositivePrice));

        let mut bad = ok;
        bad.currency = "BTC".to_string();
        assert!(matches!(bad.validate(), Err(ValidationError::UnknownCurrency(_))));
    }

    #[test]
    fn test_update_request_validation() {
        let empty = UpdateExpenseRequest::default().validate().unwrap();
        assert!(empty.is_empty());

        let req = UpdateExpenseRequest {
            title: Some(" ".to_string()),
            price: Some(Decimal::ZERO),
            currency: Some("gbp".to_string()),
        };
        let update = req.validate().unwrap();
        assert_eq!(update.title, None);
        assert_eq!(update.price, None);
        assert_eq!(update.currency, Some(Currency::Gbp));

        let negative = UpdateExpenseRequest {
            price: Some(dec!(-1)),
            ..Default::default()
        };
        assert_eq!(negative.validate(), Err(ValidationError::NegativePrice));
    }

    #[test]
    fn test_storage_limits() {
        let request = |title: String, price: Decimal| CreateExpenseRequest {
            title,
            price,
            currency: "EUR".to_string(),
        };

        let longest = "é".repeat(MAX_TITLE_CHARS);
        let new = request(longest.clone(), dec!(999999999999999999.9999999999)).validate().unwrap();
        assert_eq!(new.title, longest);
        assert_eq!(new.price.to_string(), "999999999999999999.9999999999");

        assert_eq!(
            request("x".repeat(MAX_TITLE_CHARS + 1), dec!(1)).validate(),
            Err(ValidationError::TitleTooLong { max: MAX_TITLE_CHARS })
        );
        assert_eq!(
            request("x".to_string(), dec!(0.000000000001)).validate(),
            Err(ValidationError::PriceOutOfRange)
        );
        assert_eq!(
            request("x".to_string(), dec!(1000000000000000000)).validate(),
            Err(ValidationError::PriceOutOfRange)
        );

        let update = UpdateExpenseRequest {
            title: Some("y".repeat(MAX_TITLE_CHARS + 1)),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(ValidationError::TitleTooLong { .. })));
        let update = UpdateExpenseRequest {
            price: Some(dec!(0.00000000001)),
            ..Default::default()
        };
        assert_eq!(update.validate(), Err(ValidationError::PriceOutOfRange));
    }

    #[test]
    fn test_prices_drop_trailing_zeros() {
        let new = CreateExpenseRequest {
            title: "Groceries".to_string(),
            price: dec!(54.30),
            currency: "MDL".to_string(),
        }
        .validate()
        .unwrap();
        assert_eq!(new.price.to_string(), "54.3");

        // Zeros past the scale limit are not precision.
        let update = UpdateExpenseRequest {
            price: Some(dec!(2.500000000000)),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(update.price.map(|p| p.to_string()), Some("2.5".to_string()));

        let created = OffsetDateTime::UNIX_EPOCH;
        let mut expense = sample(created);
        let direct = ExpenseUpdate {
            price: Some(dec!(7.000)),
            ..Default::default()
        };
        assert!(direct.apply_to(&mut expense, created));
        assert_eq!(expense.price.to_string(), "7");
    }

    #[test]
    fn test_noop_update_keeps_modified_at() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let mut expense = sample(created);
        let update = ExpenseUpdate {
            title: Some(String::new()),
            price: Some(dec!(-5)),
            currency: None,
        };
        assert!(!update.apply_to(&mut expense, created + Duration::hours(1)));
        assert_eq!(expense, sample(created));
    }

    #[test]
    fn test_same_values_are_not_a_change() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let mut expense = sample(created);
        let update = ExpenseUpdate {
            title: Some("Lunch".to_string()),
            price: Some(dec!(12.5)),
            currency: Some(Currency::Eur),
        };
        assert!(!update.apply_to(&mut expense, created + Duration::hours(1)));
        assert_eq!(expense.modified_at, created);
    }

    #[test]
    fn test_partial_update_touches_only_requested_fields() {
        let created = OffsetDateTime::UNIX_EPOCH;
        let later = created + Duration::minutes(5);
        let mut expense = sample(created);
        let update = ExpenseUpdate {
            price: Some(dec!(20)),
            ..Default::default()
        };
        assert!(update.apply_to(&mut expense, later));
        assert_eq!(expense.price, dec!(20));
        assert_eq!(expense.title, "Lunch");
        assert_eq!(expense.currency, Currency::Eur);
        assert_eq!(expense.created_at, created);
        assert_eq!(expense.modified_at, later);
    }

    #[test]
    fn test_modified_at_never_precedes_created_at() {
        let created = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
        let mut expense = sample(created);
        let update = ExpenseUpdate {
            title: Some("Dinner".to_string()),
            ..Default::default()
        };
        assert!(update.apply_to(&mut expense, OffsetDateTime::UNIX_EPOCH));
        assert_eq!(expense.modified_at, created);
    }
}
