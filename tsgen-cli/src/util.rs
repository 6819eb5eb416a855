use anyhow::{Context, Result};
use tsgen_engine::StateIndex;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse a comma-separated list of base states, oldest first.
pub fn parse_history(s: &str) -> Result<Vec<StateIndex>> {
    split_csv(s)
        .iter()
        .map(|token| {
            token
                .parse::<StateIndex>()
                .with_context(|| format!("invalid history state {token:?}"))
        })
        .collect()
}

/// Slice of `values` shown in console previews.
pub fn preview(values: &[f64], limit: usize) -> String {
    let shown: Vec<String> = values
        .iter()
        .take(limit)
        .map(|value| format!("{value:.2}"))
        .collect();
    let mut out = shown.join(", ");
    if values.len() > limit {
        out.push_str(&format!(", … ({} more)", values.len() - limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn parse_history_reads_states_in_order() {
        assert_eq!(parse_history("0, 3,1").unwrap(), vec![0, 3, 1]);
        assert!(parse_history("0,x").is_err());
        assert!(parse_history("70000").is_err());
    }

    #[test]
    fn preview_truncates_long_series() {
        assert_eq!(preview(&[1.0, 2.5], 4), "1.00, 2.50");
        assert_eq!(preview(&[1.0, 2.0, 3.0], 2), "1.00, 2.00, … (1 more)");
    }
}
