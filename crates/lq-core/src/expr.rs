//! Scalar expressions used by filter, mutate and aggregate steps

use lq_db::Value;
use std::fmt;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// SQL spelling of the operator
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

/// A scalar expression over the columns of a relation.
///
/// `Function` and `Raw` are passed to SQL as written; the builder does not
/// know what they mean and never validates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference by name
    Column(String),
    /// Literal value
    Literal(Value),
    /// `left op right`
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
    /// `expr [NOT] IN (list)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// Function call, name emitted verbatim
    Function { name: String, args: Vec<Expr> },
    /// Raw SQL snippet
    Raw(String),
}

/// Column reference
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Function call passed through to SQL
pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args: args.into_iter().collect(),
    }
}

/// Raw SQL snippet
pub fn raw(sql: impl Into<String>) -> Expr {
    Expr::Raw(sql.into())
}

impl Expr {
    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn not_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, right)
    }

    pub fn lt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn lt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, right)
    }

    pub fn gt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn gt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, right)
    }

    pub fn and(self, right: Expr) -> Expr {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Or, right)
    }

    pub fn plus(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Plus, right)
    }

    pub fn minus(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Minus, right)
    }

    pub fn times(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, right)
    }

    pub fn divided_by(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Divide, right)
    }

    pub fn modulo(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Modulo, right)
    }

    /// `NOT self`
    pub fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn is_in(self, list: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list: list.into_iter().collect(),
            negated: false,
        }
    }

    pub fn not_in(self, list: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list: list.into_iter().collect(),
            negated: true,
        }
    }

    /// Column names this expression reads, in first-seen order.
    ///
    /// Raw snippets are opaque and contribute nothing.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Literal(_) | Expr::Raw(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(inner) | Expr::IsNull { expr: inner, .. } => inner.collect_columns(out),
            Expr::InList { expr, list, .. } => {
                expr.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }
}

/// Dialect-neutral rendering used in operation logs
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(Value::Text(s)) => write!(f, "{:?}", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op.sql(), right),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{} {}IN ({})",
                    expr,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::Function { name, args } => {
                let items: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", name, items.join(", "))
            }
            Expr::Raw(sql) => write!(f, "sql({:?})", sql),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_columns_dedup_in_order() {
        let expr = col("b")
            .gt(lit(1))
            .and(col("a").is_in([lit(1), col("b")]))
            .or(func("lower", [col("c")]).eq(raw("'x'")));
        assert_eq!(expr.referenced_columns(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_raw_has_no_columns() {
        assert!(raw("a > 1").referenced_columns().is_empty());
    }

    #[test]
    fn test_display() {
        let expr = col("a").gt(lit(1)).and(col("name").eq(lit("x")));
        assert_eq!(expr.to_string(), "((a > 1) AND (name = \"x\"))");
        assert_eq!(col("a").is_not_null().to_string(), "a IS NOT NULL");
    }
}
