use anyhow::{Context, Result};
use sd_core::ledger::LAMPORTS_PER_SOL;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count in base-1000 units with up to two decimals.
pub fn space_string(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1e3 && unit < UNITS.len() - 1 {
        value /= 1e3;
        unit += 1;
    }
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[unit])
}

/// Formats lamports as SOL.
pub fn sol_string(lamports: u64) -> String {
    format!("{:.9} SOL", lamports as f64 / LAMPORTS_PER_SOL as f64)
}

/// Parses an amount given either in lamports or as SOL with a `sol`
/// suffix, e.g. `0.5sol`.
pub fn parse_lamports(s: &str) -> Result<u64> {
    let s = s.trim();
    match s.strip_suffix("sol").or_else(|| s.strip_suffix("SOL")) {
        Some(sol) => {
            let sol: f64 = sol.trim().parse().with_context(|| format!("invalid amount '{s}'"))?;
            Ok((sol * LAMPORTS_PER_SOL as f64).round() as u64)
        }
        None => s.parse().with_context(|| format!("invalid amount '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_decimal_units() {
        assert_eq!(space_string(0), "0 B");
        assert_eq!(space_string(1000), "1000 B");
        assert_eq!(space_string(1001), "1 KB");
        assert_eq!(space_string(1_500_000), "1.5 MB");
        assert_eq!(space_string(2_345_678_901), "2.35 GB");
        assert_eq!(space_string(u64::MAX), "18446744.07 TB");
    }

    #[test]
    fn amounts_accept_sol_suffix() {
        assert_eq!(parse_lamports("5000").unwrap(), 5000);
        assert_eq!(parse_lamports("0.5sol").unwrap(), 500_000_000);
        assert_eq!(parse_lamports("2 SOL").unwrap(), 2_000_000_000);
        assert!(parse_lamports("lots").is_err());
        assert_eq!(sol_string(1_500_000_000), "1.500000000 SOL");
    }
}
