use crate::prelude::*;

/// One entry from a requires-dist list: name, extras (parsed but otherwise
/// ignored here), a specifier set, and an optional environment marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: Vec<String>,
    pub specifiers: Specifiers,
    pub env_marker: Option<marker::Expr>,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Requirement> {
        super::reqparse::requirement(input).wrap_err_with(|| {
            format!("failed to parse requirement string {:?}", input)
        })
    }
}

pub mod marker {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Value {
        Variable(String),
        Literal(String),
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum Op {
        Compare(CompareOp),
        In,
        NotIn,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Expr {
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
        Operator { op: Op, lhs: Value, rhs: Value },
    }

    impl Value {
        pub fn eval(&self, env: &HashMap<String, String>) -> Result<String> {
            match self {
                Value::Variable(varname) => {
                    env.get(varname).cloned().ok_or_else(|| {
                        eyre!("no environment marker named '{}'", varname)
                    })
                }
                Value::Literal(s) => Ok(s.clone()),
            }
        }
    }

    impl Expr {
        /// Errors mean "an unbound variable was actually needed": `and`/`or`
        /// short-circuit, so a decided left-hand side never touches the right.
        pub fn eval(&self, env: &HashMap<String, String>) -> Result<bool> {
            Ok(match self {
                Expr::And(lhs, rhs) => lhs.eval(env)? && rhs.eval(env)?,
                Expr::Or(lhs, rhs) => lhs.eval(env)? || rhs.eval(env)?,
                Expr::Operator { op, lhs, rhs } => {
                    let lhs_val = lhs.eval(env)?;
                    let rhs_val = rhs.eval(env)?;
                    match op {
                        Op::In => rhs_val.contains(&lhs_val),
                        Op::NotIn => !rhs_val.contains(&lhs_val),
                        Op::Compare(op) => {
                            // If both sides can be parsed as versions (or the
                            // RHS can be parsed as a wildcard with a
                            // wildcard-accepting op), then we do a version
                            // comparison
                            if let Ok(lhs_ver) = lhs_val.parse::<Version>() {
                                if let Ok(rhs_ranges) = op.to_ranges(&rhs_val) {
                                    return Ok(rhs_ranges
                                        .into_iter()
                                        .any(|r| r.contains(&lhs_ver)));
                                }
                            }
                            // Otherwise, we do a simple string comparison
                            use CompareOp::*;
                            match op {
                                LessThanEqual => lhs_val <= rhs_val,
                                StrictlyLessThan => lhs_val < rhs_val,
                                NotEqual => lhs_val != rhs_val,
                                Equal => lhs_val == rhs_val,
                                ArbitraryEqual => lhs_val == rhs_val,
                                GreaterThanEqual => lhs_val >= rhs_val,
                                StrictlyGreaterThan => lhs_val > rhs_val,
                                Compatible => {
                                    bail!("~= requires valid version strings")
                                }
                            }
                        }
                    }
                }
            })
        }
    }
}
