//! Monetary constants

/// Amount in base units
pub type Amount = u64;

/// Base units per coin
pub const COIN: Amount = 100_000_000;

/// Format an amount as a decimal coin value
pub fn format_amount(amount: Amount) -> String {
    format!("{}.{:08}", amount / COIN, amount % COIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(50 * COIN), "50.00000000");
        assert_eq!(format_amount(COIN / 2), "0.50000000");
    }
}
