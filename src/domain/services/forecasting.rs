//! Return forecast and equal-weight allocation.
//!
//! Daily closing prices for M assets over N days are arranged into an
//! `[M x N]` matrix. A linear auto-regression with an intercept is fitted by
//! ordinary least squares: each asset's next-day gross return is regressed on
//! every asset's same-day gross return. The fitted coefficients are applied to
//! the most recent returns to forecast tomorrow's, and the allocation gives an
//! equal share to every asset whose forecast is positive.
//!
//! Prices and weights stay in `BigDecimal`; the regression runs in `f64`.
//! Ratios are the only values crossing between the two.

use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::entities::target_weighting::TargetWeighting;
use crate::domain::errors::ForecastError;
use crate::domain::services::linear_algebra::{inverse, multiply};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Minimum days needed to form one regression row from lag-1 and lag-2 returns.
pub const MIN_HISTORY_DAYS: usize = 3;

/// Asset name to matrix row, assigned in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexLookup {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl IndexLookup {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn insert(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            self.index.insert(name.to_string(), self.names.len());
            self.names.push(name.to_string());
        }
    }
}

/// Prices per asset, one row per asset in lookup order.
///
/// Rows may be ragged until `validate_price_matrix` has accepted them.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatrix {
    names: Vec<String>,
    rows: Vec<Vec<BigDecimal>>,
}

impl PriceMatrix {
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<BigDecimal>>) -> Self {
        Self { names, rows }
    }

    pub fn asset_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, asset: usize) -> &[BigDecimal] {
        &self.rows[asset]
    }

    fn name(&self, asset: usize) -> &str {
        self.names.get(asset).map(String::as_str).unwrap_or("?")
    }

    /// `P[asset, to] / P[asset, from]` as a double.
    fn ratio(&self, asset: usize, to: usize, from: usize) -> Result<f64, ForecastError> {
        let row = &self.rows[asset];
        let denominator = &row[from];
        if denominator.is_zero() {
            return Err(ForecastError::NonPositivePrice {
                asset: self.name(asset).to_string(),
                day: from,
            });
        }
        (&row[to] / denominator)
            .to_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ForecastError::RatioOutOfRange(self.name(asset).to_string()))
    }

    fn ensure_days(&self, lookback_days: usize) -> Result<(), ForecastError> {
        for (asset, row) in self.rows.iter().enumerate() {
            if row.len() < lookback_days {
                return Err(ForecastError::UnexpectedPriceCount {
                    asset: self.name(asset).to_string(),
                    expected: lookback_days,
                    actual: row.len(),
                });
            }
        }
        Ok(())
    }
}

/// Regression inputs derived from a price matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrices {
    /// `[assets x (days - 2)]`, the return one step after each predictor column.
    pub returns: DMatrix<f64>,
    /// `[(assets + 1) x (days - 2)]`, row 0 is the intercept.
    pub const_returns: DMatrix<f64>,
}

pub fn create_index_lookup(prices: &[PriceSnapshot]) -> IndexLookup {
    let mut lookup = IndexLookup::default();
    for price in prices {
        lookup.insert(&price.name);
    }
    lookup
}

/// Places each `last` price in the next free slot of its asset's row.
///
/// `prices` must already be in timestamp order.
pub fn convert_to_price_matrix(prices: &[PriceSnapshot], lookup: &IndexLookup) -> PriceMatrix {
    let mut rows: Vec<Vec<BigDecimal>> = vec![Vec::new(); lookup.len()];
    for price in prices {
        if let Some(index) = lookup.index_of(&price.name) {
            rows[index].push(price.last.clone());
        }
    }
    PriceMatrix::from_rows(lookup.names().to_vec(), rows)
}

/// Every row must hold exactly `lookback_days` positive prices, and there must
/// be enough days to form a regression row.
pub fn validate_price_matrix(matrix: &PriceMatrix, lookback_days: usize) -> Result<(), ForecastError> {
    for (asset, row) in matrix.rows.iter().enumerate() {
        if row.len() != lookback_days {
            return Err(ForecastError::UnexpectedPriceCount {
                asset: matrix.name(asset).to_string(),
                expected: lookback_days,
                actual: row.len(),
            });
        }
    }

    if lookback_days < MIN_HISTORY_DAYS {
        return Err(ForecastError::InsufficientHistory(lookback_days));
    }

    for (asset, row) in matrix.rows.iter().enumerate() {
        if let Some(day) = row.iter().position(|p| *p <= BigDecimal::zero()) {
            return Err(ForecastError::NonPositivePrice {
                asset: matrix.name(asset).to_string(),
                day,
            });
        }
    }

    Ok(())
}

pub fn calculate_returns_matrices(
    matrix: &PriceMatrix,
    lookback_days: usize,
) -> Result<ReturnsMatrices, ForecastError> {
    if lookback_days < MIN_HISTORY_DAYS {
        return Err(ForecastError::InsufficientHistory(lookback_days));
    }
    matrix.ensure_days(lookback_days)?;

    let assets = matrix.asset_count();
    let observations = lookback_days - 2;
    let mut returns = DMatrix::<f64>::zeros(assets, observations);
    let mut const_returns = DMatrix::<f64>::from_element(assets + 1, observations, 1.0);

    for day in 0..observations {
        for asset in 0..assets {
            const_returns[(asset + 1, day)] = matrix.ratio(asset, day + 1, day)?;
            returns[(asset, day)] = matrix.ratio(asset, day + 2, day + 1)?;
        }
    }

    Ok(ReturnsMatrices {
        returns,
        const_returns,
    })
}

/// Intercept followed by each asset's most recent lag-1 return, `[(assets + 1) x 1]`.
pub fn calculate_last_returns_matrix(
    matrix: &PriceMatrix,
    lookback_days: usize,
) -> Result<DMatrix<f64>, ForecastError> {
    if lookback_days < 2 {
        return Err(ForecastError::InsufficientHistory(lookback_days));
    }
    matrix.ensure_days(lookback_days)?;

    let assets = matrix.asset_count();
    let mut last_returns = DMatrix::<f64>::from_element(assets + 1, 1, 1.0);
    for asset in 0..assets {
        last_returns[(asset + 1, 0)] =
            matrix.ratio(asset, lookback_days - 1, lookback_days - 2)?;
    }
    Ok(last_returns)
}

/// Least-squares fit via the normal equations, evaluated at `last_returns`.
///
/// Returns the forecast gross return per asset, `[assets x 1]`.
pub fn calculate_expected_returns(
    matrices: &ReturnsMatrices,
    last_returns: &DMatrix<f64>,
) -> Result<DMatrix<f64>, ForecastError> {
    let x_t = &matrices.const_returns;
    let y_t = &matrices.returns;

    if x_t.ncols() != y_t.ncols() {
        return Err(ForecastError::DimensionMismatch(format!(
            "{} predictor observations but {} target observations",
            x_t.ncols(),
            y_t.ncols()
        )));
    }
    if last_returns.shape() != (x_t.nrows(), 1) {
        return Err(ForecastError::DimensionMismatch(format!(
            "last returns are {}x{}, expected {}x1",
            last_returns.nrows(),
            last_returns.ncols(),
            x_t.nrows()
        )));
    }

    let x = x_t.transpose();
    let y = y_t.transpose();

    let normal = multiply(x_t, &x)?;
    let normal_inv = inverse(&normal)?;
    let coefficients = multiply(&multiply(&normal_inv, x_t)?, &y)?;

    let forecast = multiply(&last_returns.transpose(), &coefficients)?;
    Ok(forecast.transpose())
}

/// Equal weight `1/k` for the `k` assets with a positive forecast, zero for the rest.
///
/// An empty lookup or an empty forecast yields an empty set.
pub fn calculate_target_weights(
    expected_returns: &DMatrix<f64>,
    lookup: &IndexLookup,
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> Result<Vec<TargetWeighting>, ForecastError> {
    if expected_returns.ncols() > 1 {
        return Err(ForecastError::InvalidOutputShape(expected_returns.ncols()));
    }
    if lookup.is_empty() || expected_returns.nrows() == 0 || expected_returns.ncols() == 0 {
        return Ok(Vec::new());
    }

    let positive = expected_returns.iter().filter(|v| **v > 0.0).count();
    let share = if positive > 0 {
        BigDecimal::from(1) / BigDecimal::from(positive as i64)
    } else {
        BigDecimal::zero()
    };

    lookup
        .names()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let forecast = expected_returns.get((index, 0)).ok_or_else(|| {
                ForecastError::IndexOutOfRange {
                    asset: name.clone(),
                    index,
                }
            })?;
            let weight = if *forecast > 0.0 {
                share.clone()
            } else {
                BigDecimal::zero()
            };
            Ok(TargetWeighting::new(exchange, name.as_str(), weight, timestamp))
        })
        .collect()
}

/// Runs the whole forecast over a flat history of daily prices.
pub fn forecast_target_weights(
    prices: &[PriceSnapshot],
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> Result<Vec<TargetWeighting>, ForecastError> {
    if prices.is_empty() {
        return Err(ForecastError::NoData);
    }

    let mut ordered = prices.to_vec();
    ordered.sort_by_key(|p| p.timestamp);

    let lookup = create_index_lookup(&ordered);
    let lookback_days = ordered.len() / lookup.len();

    let matrix = convert_to_price_matrix(&ordered, &lookup);
    validate_price_matrix(&matrix, lookback_days)?;

    let matrices = calculate_returns_matrices(&matrix, lookback_days)?;
    let last_returns = calculate_last_returns_matrix(&matrix, lookback_days)?;
    let expected = calculate_expected_returns(&matrices, &last_returns)?;

    calculate_target_weights(&expected, &lookup, exchange, timestamp)
}
