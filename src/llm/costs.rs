//! Per-token pricing for known models. Unknown models cost zero rather
//! than guessing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// `(input, output)` USD cost per token for a model name.
///
/// Prefix matching, most specific first: provider deployments suffix model
/// names with dates.
pub fn model_rates(model: &str) -> (Decimal, Decimal) {
    if model.starts_with("gpt-4o-mini") {
        (dec!(0.00000015), dec!(0.0000006))
    } else if model.starts_with("gpt-4o") {
        (dec!(0.0000025), dec!(0.00001))
    } else if model.starts_with("gpt-4.1-mini") {
        (dec!(0.0000004), dec!(0.0000016))
    } else if model.starts_with("gpt-4.1") {
        (dec!(0.000002), dec!(0.000008))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

/// Dollar cost of one completion at the given rates.
pub fn completion_cost(
    input_tokens: u32,
    output_tokens: u32,
    rates: (Decimal, Decimal),
) -> Decimal {
    Decimal::from(input_tokens) * rates.0 + Decimal::from(output_tokens) * rates.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_rates_win_over_base_prefix() {
        let (input, _) = model_rates("gpt-4o-mini-2024-07-18");
        assert_eq!(input, dec!(0.00000015));

        let (input, _) = model_rates("gpt-4o-2024-08-06");
        assert_eq!(input, dec!(0.0000025));
    }

    #[test]
    fn unknown_models_cost_zero() {
        assert_eq!(model_rates("local-llama"), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn completion_cost_arithmetic() {
        let rates = (dec!(0.000001), dec!(0.000002));
        // 1000 in + 500 out at 1/2 micro-dollars per token.
        assert_eq!(completion_cost(1000, 500, rates), dec!(0.002));
    }
}
