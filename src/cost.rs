//! Token cost accounting.

use serde::{Deserialize, Serialize};

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// USD prices per million tokens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostRates {
    /// Price per million input tokens.
    pub input_per_million: f64,
    /// Price per million output tokens.
    pub output_per_million: f64,
}

/// Cost of one model call, as 6-decimal strings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    /// Cost of the input tokens.
    pub input_cost: String,
    /// Cost of the output tokens.
    pub output_cost: String,
    /// Sum of both.
    pub total_cost: String,
}

impl CostBreakdown {
    /// Numeric total, identical to `total_cost` parsed as a float.
    pub fn total(&self) -> f64 {
        self.total_cost.parse().unwrap_or(0.0)
    }
}

fn format_usd(value: f64) -> String {
    format!("{value:.6}")
}

/// Prices `input_tokens` and `output_tokens` at `rates`.
pub fn calculate(rates: &CostRates, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
    let input = input_tokens as f64 / TOKENS_PER_MILLION * rates.input_per_million;
    let output = output_tokens as f64 / TOKENS_PER_MILLION * rates.output_per_million;
    CostBreakdown {
        input_cost: format_usd(input),
        output_cost: format_usd(output),
        total_cost: format_usd(input + output),
    }
}
