pub mod forecasting;
pub mod linear_algebra;
