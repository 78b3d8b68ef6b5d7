//! Account-level data
//!
//! Each row of the account table becomes one `Account`. Dates are
//! normalised to month ends on load and ratings shift to 0-based indices.
//! The module also generates synthetic books from portfolio assumptions
//! (business-plan forecasts) and steps reporting dates forward for dynamic
//! balance-sheet forecasts.

use crate::dates::{parse_month_end, MonthEnd};
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Whether an account comes from the actual book or a business plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Actual,
    Simulated,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Actual => write!(f, "Actual"),
            AccountType::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Interest rate contract type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestRateType {
    Fixed,
    Float,
}

impl InterestRateType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "FIXED" => Ok(InterestRateType::Fixed),
            "FLOAT" | "FLOATING" => Ok(InterestRateType::Float),
            other => Err(EngineError::invalid_config(
                "interest_rate_type",
                format!("unrecognised type '{other}'"),
            )),
        }
    }
}

/// A single financial account at the reporting date
#[derive(Debug, Clone)]
pub struct Account {
    pub contract_id: String,
    pub segment_id: i64,
    pub outstanding_balance: f64,
    /// Credit limit; only used by the CCF exposure models
    pub limit: f64,
    pub current_arrears: f64,
    pub contractual_payment: f64,
    /// Contractual payments per year (1, 2, 4 or 12)
    pub contractual_freq: u32,
    pub interest_rate_type: InterestRateType,
    /// Interest compounding periods per year
    pub interest_rate_freq: u32,
    pub fixed_rate: f64,
    pub spread: f64,
    pub origination_date: MonthEnd,
    pub payment_holiday_end_date: Option<MonthEnd>,
    pub maturity_date: MonthEnd,
    pub reporting_date: MonthEnd,
    /// Number of monthly horizons in the ECL curve (>= 1)
    pub remaining_life: u32,
    pub collateral_value: f64,
    /// 0-based rating index at origination
    pub origination_rating: usize,
    /// 0-based rating index at the reporting date
    pub current_rating: usize,
    /// Stage override (1-3) applied for the watchlist period
    pub watchlist: Option<u8>,
    pub account_type: AccountType,
}

impl Account {
    /// Months between origination and the reporting date.
    pub fn time_on_book(&self) -> i32 {
        self.reporting_date - self.origination_date
    }

    /// The forecast reporting date at horizon `t`.
    pub fn horizon_date(&self, t: usize) -> MonthEnd {
        self.reporting_date + t as i32
    }

    /// Months from the reporting date until the payment holiday ends
    /// (zero when there is none or it already ended).
    pub fn months_in_holiday(&self) -> u32 {
        match self.payment_holiday_end_date {
            Some(end) => (end - self.reporting_date).max(0) as u32,
            None => 0,
        }
    }

    /// Step the reporting date forward for a dynamic forecast run.
    /// Returns `None` once the account has no remaining life left.
    pub fn offset(&self, months: u32) -> Option<Account> {
        if months >= self.remaining_life {
            return None;
        }
        let mut stepped = self.clone();
        stepped.reporting_date = self.reporting_date + months as i32;
        stepped.remaining_life = self.remaining_life - months;
        Some(stepped)
    }

    pub fn validate(&self) -> Result<()> {
        let ctx = |field: &str| format!("account {} {field}", self.contract_id);
        if self.remaining_life < 1 {
            return Err(EngineError::invalid_config(
                ctx("remaining_life"),
                "must be at least 1",
            ));
        }
        if ![1, 2, 4, 12].contains(&self.contractual_freq) {
            return Err(EngineError::invalid_config(
                ctx("contractual_freq"),
                format!("{} not one of 1, 2, 4, 12", self.contractual_freq),
            ));
        }
        if self.interest_rate_freq < 1 {
            return Err(EngineError::invalid_config(
                ctx("interest_rate_freq"),
                "must be at least 1",
            ));
        }
        if let Some(w) = self.watchlist {
            if !(1..=3).contains(&w) {
                return Err(EngineError::invalid_config(
                    ctx("watchlist"),
                    format!("{w} not one of 1, 2, 3"),
                ));
            }
        }
        Ok(())
    }
}

/// Raw CSV row matching the account table columns
#[derive(Debug, Deserialize)]
struct AccountRow {
    contract_id: String,
    segment_id: i64,
    outstanding_balance: f64,
    limit: f64,
    current_arrears: f64,
    contractual_payment: f64,
    contractual_freq: u32,
    interest_rate_type: String,
    interest_rate_freq: u32,
    fixed_rate: f64,
    spread: f64,
    origination_date: String,
    #[serde(default)]
    payment_holiday_end_date: Option<String>,
    maturity_date: String,
    reporting_date: String,
    remaining_life: u32,
    collateral_value: f64,
    origination_rating: usize,
    current_rating: usize,
    #[serde(default)]
    watchlist: Option<u8>,
}

/// The account book to run the model on
#[derive(Debug, Clone, Default)]
pub struct AccountData {
    accounts: Vec<Account>,
}

impl AccountData {
    pub fn new(accounts: Vec<Account>) -> Result<Self> {
        for account in &accounts {
            account.validate()?;
        }
        Ok(Self { accounts })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    /// Combine the actual book with another (e.g. a simulated book).
    pub fn union(mut self, other: AccountData) -> AccountData {
        self.accounts.extend(other.accounts);
        self
    }

    /// Step every account's reporting date forward, dropping accounts
    /// that run off the book.
    pub fn offset(&self, months: u32) -> AccountData {
        AccountData {
            accounts: self.accounts.iter().filter_map(|a| a.offset(months)).collect(),
        }
    }

    /// Load the actual book from the account CSV table.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;

        let mut accounts = Vec::new();
        for row in reader.deserialize::<AccountRow>() {
            let row = row.map_err(|e| EngineError::io(path.display().to_string(), e))?;
            accounts.push(account_from_row(row)?);
        }
        Self::new(accounts)
    }
}

fn parse_date_field(contract_id: &str, field: &str, value: &str) -> Result<MonthEnd> {
    parse_month_end(value).ok_or_else(|| {
        EngineError::invalid_config(
            format!("account {contract_id} {field}"),
            format!("unparseable date '{value}'"),
        )
    })
}

fn account_from_row(row: AccountRow) -> Result<Account> {
    if row.origination_rating < 1 || row.current_rating < 1 {
        return Err(EngineError::invalid_config(
            format!("account {}", row.contract_id),
            "ratings are 1-based",
        ));
    }
    let holiday = match row.payment_holiday_end_date.as_deref() {
        Some(s) if !s.trim().is_empty() => Some(parse_date_field(
            &row.contract_id,
            "payment_holiday_end_date",
            s,
        )?),
        _ => None,
    };

    Ok(Account {
        origination_date: parse_date_field(&row.contract_id, "origination_date", &row.origination_date)?,
        maturity_date: parse_date_field(&row.contract_id, "maturity_date", &row.maturity_date)?,
        reporting_date: parse_date_field(&row.contract_id, "reporting_date", &row.reporting_date)?,
        payment_holiday_end_date: holiday,
        interest_rate_type: InterestRateType::parse(&row.interest_rate_type)?,
        origination_rating: row.origination_rating - 1,
        current_rating: row.current_rating - 1,
        contract_id: row.contract_id,
        segment_id: row.segment_id,
        outstanding_balance: row.outstanding_balance,
        limit: row.limit,
        current_arrears: row.current_arrears,
        contractual_payment: row.contractual_payment,
        contractual_freq: row.contractual_freq,
        interest_rate_freq: row.interest_rate_freq,
        fixed_rate: row.fixed_rate,
        spread: row.spread,
        remaining_life: row.remaining_life,
        collateral_value: row.collateral_value,
        watchlist: row.watchlist,
        account_type: AccountType::Actual,
    })
}

/// One row of the portfolio-assumptions table (long form: one origination
/// cohort per row)
#[derive(Debug, Deserialize)]
struct PortfolioRow {
    segment_id: i64,
    #[serde(rename = "type")]
    product_type: String,
    term: u32,
    balloon: f64,
    interest_rate_type: String,
    interest_rate: f64,
    spread: f64,
    frequency: u32,
    origination_rating: usize,
    ltv: f64,
    origination_date: String,
    origination_amount: f64,
}

/// Annuity payment for principal `pv`, periodic rate `i`, `n` payments and
/// balloon `fv`.
fn pmt(pv: f64, i: f64, n: f64, fv: f64) -> f64 {
    if i == 0.0 {
        return (pv - fv) / n;
    }
    (pv - fv * (1.0 + i).powf(-n)) * (i / (1.0 - (1.0 + i).powf(-n)))
}

/// Generate a simulated loan book from the portfolio assumptions table.
pub fn simulated_accounts_from_csv(path: &Path) -> Result<AccountData> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;

    let mut accounts = Vec::new();
    for (id, row) in reader.deserialize::<PortfolioRow>().enumerate() {
        let row = row.map_err(|e| EngineError::io(path.display().to_string(), e))?;
        if row.origination_amount <= 0.0 {
            continue;
        }
        accounts.push(simulated_account(id, row)?);
    }
    AccountData::new(accounts)
}

fn simulated_account(id: usize, row: PortfolioRow) -> Result<Account> {
    let contract_id = format!("FA-{id:06}");
    let origination = parse_date_field(&contract_id, "origination_date", &row.origination_date)?;
    if row.origination_rating < 1 {
        return Err(EngineError::invalid_config(
            format!("account {contract_id}"),
            "ratings are 1-based",
        ));
    }

    let product = row.product_type.trim().to_uppercase();
    let revolving = product == "REVOLVING";
    let payment = match product.as_str() {
        "AMORTISING" | "IO" | "BULLET" => {
            let balloon = if product == "BULLET" {
                0.0
            } else {
                row.origination_amount * row.balloon
            };
            let rate_per_period =
                (1.0 + row.interest_rate / 12.0).powf(12.0 / row.frequency as f64) - 1.0;
            let n_payments = row.term as f64 / 12.0 * row.frequency as f64;
            pmt(row.origination_amount, rate_per_period, n_payments, balloon)
        }
        _ => 0.0,
    };
    let collateral_value = if row.ltv > 0.0 {
        row.origination_amount / row.ltv
    } else {
        0.0
    };

    Ok(Account {
        contract_id,
        segment_id: row.segment_id,
        outstanding_balance: if revolving { 0.0 } else { row.origination_amount },
        limit: if revolving { row.origination_amount } else { 0.0 },
        current_arrears: 0.0,
        contractual_payment: payment,
        contractual_freq: row.frequency,
        interest_rate_type: InterestRateType::parse(&row.interest_rate_type)?,
        interest_rate_freq: 12,
        fixed_rate: row.interest_rate,
        spread: row.spread,
        origination_date: origination,
        payment_holiday_end_date: None,
        maturity_date: origination + row.term as i32,
        reporting_date: origination,
        remaining_life: row.term,
        collateral_value,
        origination_rating: row.origination_rating - 1,
        current_rating: row.origination_rating - 1,
        watchlist: None,
        account_type: AccountType::Simulated,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_time_on_book() {
        let mut account = test_fixtures::fixed_rate_loan(100_000.0, 0.06, 60);
        account.origination_date = MonthEnd::from_ym(2020, 3);
        account.reporting_date = MonthEnd::from_ym(2024, 3);
        assert_eq!(account.time_on_book(), 48);
    }

    #[test]
    fn test_offset_steps_and_drops() {
        let account = test_fixtures::fixed_rate_loan(100_000.0, 0.06, 24);
        let stepped = account.offset(12).unwrap();
        assert_eq!(stepped.remaining_life, 12);
        assert_eq!(stepped.reporting_date, account.reporting_date + 12);
        assert!(account.offset(24).is_none());
    }

    #[test]
    fn test_validation() {
        let mut account = test_fixtures::fixed_rate_loan(100_000.0, 0.06, 60);
        assert!(account.validate().is_ok());

        account.watchlist = Some(4);
        assert!(account.validate().is_err());
        account.watchlist = Some(2);

        account.contractual_freq = 3;
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_pmt_amortises_to_zero() {
        // 100k at 6%/yr over 60 monthly payments
        let i = 0.06 / 12.0;
        let payment = pmt(100_000.0, i, 60.0, 0.0);
        let mut balance = 100_000.0;
        for _ in 0..60 {
            balance = balance * (1.0 + i) - payment;
        }
        assert_relative_eq!(balance, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pmt_zero_rate() {
        assert_relative_eq!(pmt(1200.0, 0.0, 12.0, 0.0), 100.0);
    }

    #[test]
    fn test_offset_book() {
        let data = AccountData::new(vec![
            test_fixtures::fixed_rate_loan(100.0, 0.05, 6),
            test_fixtures::fixed_rate_loan(200.0, 0.05, 36),
        ])
        .unwrap();
        let stepped = data.offset(12);
        assert_eq!(stepped.len(), 1);
        assert_eq!(stepped.iter().next().unwrap().remaining_life, 24);
    }
}
