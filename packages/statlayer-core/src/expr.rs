//! Row-wise derived metrics.
//!
//! Expressions evaluate to `Option<f64>`: any null operand, and any division
//! whose denominator is zero or null, yields `None`, which lands in the table
//! as a null cell. No derived metric can produce an infinity or panic.

use crate::error::{Result, TableError};
use crate::table::{Column, Row, Table};
use crate::value::{ColumnType, Value};
use std::ops;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Col(String),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Col(name.into())
    }

    pub fn lit(v: f64) -> Self {
        Expr::Const(v)
    }

    /// `100 * numerator / denominator`.
    pub fn pct(numerator: Expr, denominator: Expr) -> Self {
        Expr::lit(100.0) * (numerator / denominator)
    }

    pub fn eval(&self, row: Row<'_>) -> Option<f64> {
        let v = match self {
            Expr::Col(name) => row.get(name).as_f64(),
            Expr::Const(v) => Some(*v),
            Expr::Add(a, b) => Some(a.eval(row)? + b.eval(row)?),
            Expr::Sub(a, b) => Some(a.eval(row)? - b.eval(row)?),
            Expr::Mul(a, b) => Some(a.eval(row)? * b.eval(row)?),
            Expr::Div(a, b) => {
                let denominator = b.eval(row)?;
                if denominator == 0.0 {
                    return None;
                }
                Some(a.eval(row)? / denominator)
            }
        };
        v.filter(|v| v.is_finite())
    }

    fn columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Col(name) => out.push(name),
            Expr::Const(_) => {}
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.columns(out);
                b.columns(out);
            }
        }
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

binary_op!(Add, add, Add);
binary_op!(Sub, sub, Sub);
binary_op!(Mul, mul, Mul);
binary_op!(Div, div, Div);

/// A named float column computed from an [`Expr`].
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub name: String,
    pub expr: Expr,
    pub round: Option<u32>,
}

impl Derivation {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
            round: None,
        }
    }

    pub fn rounded(mut self, places: u32) -> Self {
        self.round = Some(places);
        self
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(v: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (v * scale).round() / scale
}

/// Append each derivation as a float column, in order. Later derivations
/// may reference earlier ones; a derivation reusing an existing name
/// replaces that column.
pub fn derive(table: &Table, derivations: &[Derivation]) -> Result<Table> {
    let mut out = table.clone();
    for d in derivations {
        let mut referenced = Vec::new();
        d.expr.columns(&mut referenced);
        if let Some(missing) = referenced.into_iter().find(|c| !out.has_column(c)) {
            return Err(TableError::column_not_found(missing));
        }
        let values: Vec<Value> = out
            .rows()
            .map(|row| {
                let v = d.expr.eval(row);
                let v = match d.round {
                    Some(places) => v.map(|v| round_to(v, places)),
                    None => v,
                };
                Value::from(v)
            })
            .collect();
        out = out.with_column(Column::new(d.name.clone(), ColumnType::Float, values)?)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batting() -> Table {
        Table::from_rows(
            &[
                ("Team", ColumnType::Str),
                ("H", ColumnType::Int),
                ("AB", ColumnType::Int),
            ],
            vec![
                vec!["Cubs".into(), 30.into(), 100.into()],
                vec!["Mets".into(), 0.into(), 0.into()],
                vec!["Reds".into(), 5.into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_zero_denominator_is_null() {
        let out = derive(
            &batting(),
            &[Derivation::new("AVG", Expr::col("H") / Expr::col("AB")).rounded(3)],
        )
        .unwrap();
        assert_eq!(out.value(0, "AVG"), Some(&Value::Float(0.3)));
        assert_eq!(out.value(1, "AVG"), Some(&Value::Null));
        assert_eq!(out.value(2, "AVG"), Some(&Value::Null));
    }

    #[test]
    fn test_later_derivation_sees_earlier() {
        let out = derive(
            &batting(),
            &[
                Derivation::new("Outs", Expr::col("AB") - Expr::col("H")),
                Derivation::new("Out%", Expr::pct(Expr::col("Outs"), Expr::col("AB"))).rounded(1),
            ],
        )
        .unwrap();
        assert_eq!(out.value(0, "Outs"), Some(&Value::Float(70.0)));
        assert_eq!(out.value(0, "Out%"), Some(&Value::Float(70.0)));
    }

    #[test]
    fn test_unknown_column() {
        let err = derive(&batting(), &[Derivation::new("x", Expr::col("BB"))]).unwrap_err();
        assert_eq!(err, TableError::ColumnNotFound("BB".to_string()));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(2.0 / 3.0, 3), 0.667);
    }
}
