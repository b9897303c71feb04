//! `eval`: the safe expression evaluator on the command line.

use qcell_core::expr::{self, Number};

use crate::colors;

/// Evaluate `source`, once, or once per value with `var` substituted.
pub fn execute(source: &str, var: &str, values: Option<&str>) -> anyhow::Result<()> {
    let Some(values) = values else {
        println!("{}", expr::eval_str(source)?);
        return Ok(());
    };

    let values = parse_values(values)?;
    let results = expr::project_each(source, var, &values)?;
    let mut failed = 0;
    for (value, result) in values.iter().zip(results) {
        match result {
            Ok(n) => println!("{var}={value}\t{n}"),
            Err(e) => {
                failed += 1;
                println!("{var}={value}\t{}{}{}", colors::RED, e, colors::RESET);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} evaluations failed", values.len());
    }
    Ok(())
}

/// `1,2.5,-3` as numbers.
fn parse_values(values: &str) -> anyhow::Result<Vec<Number>> {
    values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<i64>()
                .map(Number::Int)
                .or_else(|_| v.parse::<f64>().map(Number::Float))
                .map_err(|_| anyhow::anyhow!("`{v}` is not a number"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values() {
        assert_eq!(
            parse_values("1, 2.5,-3").unwrap(),
            vec![Number::Int(1), Number::Float(2.5), Number::Int(-3)]
        );
        assert!(parse_values("1,x").is_err());
    }
}
