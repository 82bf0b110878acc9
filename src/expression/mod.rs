//! 属性条件式（サブセット・フィルタ式）
//!
//! SQL風の式を解析し、地物の属性とジオメトリに対して評価する。
//! NULL を含む論理演算は3値論理に従う。

mod eval;
mod lexer;
mod parser;

use std::collections::BTreeSet;
use std::fmt;

use geo_types::Geometry;

use crate::error::{DmError, Result};
use crate::fields::Fields;
use crate::model::AttributeValue;

/// 式の評価値
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl From<AttributeValue> for Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Null => Value::Null,
            AttributeValue::Int(v) => Value::Int(v),
            AttributeValue::Double(v) => Value::Double(v),
            AttributeValue::Text(v) => Value::Text(v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// 評価対象の地物
pub trait FeatureContext {
    /// 属性値（名前は大文字小文字を区別しない）。未知の属性は NULL
    fn attribute(&self, name: &str) -> AttributeValue;
    fn geometry(&self) -> Option<&Geometry<f64>>;
    fn feature_id(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Area,
    Length,
    X,
    Y,
    Id,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "area" => Some(Variable::Area),
            "length" => Some(Variable::Length),
            "x" => Some(Variable::X),
            "y" => Some(Variable::Y),
            "id" => Some(Variable::Id),
            _ => None,
        }
    }

    fn needs_geometry(self) -> bool {
        !matches!(self, Variable::Id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Lower,
    Upper,
    Length,
    Abs,
    Coalesce,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lower" => Some(Function::Lower),
            "upper" => Some(Function::Upper),
            "length" => Some(Function::Length),
            "abs" => Some(Function::Abs),
            "coalesce" => Some(Function::Coalesce),
            _ => None,
        }
    }

    fn accepts(self, count: usize) -> bool {
        match self {
            Function::Coalesce => count >= 1,
            _ => count == 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Variable(Variable),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
        negated: bool,
    },
    Function {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Variable(_) => {}
            Expr::Not(inner) | Expr::Negate(inner) => inner.visit(f),
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::IsNull { expr, .. } => expr.visit(f),
            Expr::In { expr, list, .. } => {
                expr.visit(f);
                for e in list {
                    e.visit(f);
                }
            }
            Expr::Like { expr, pattern, .. } => {
                expr.visit(f);
                pattern.visit(f);
            }
            Expr::Function { args, .. } => {
                for e in args {
                    e.visit(f);
                }
            }
        }
    }
}

/// 解析済みの条件式
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    root: Expr,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            text: text.to_string(),
            root: parser::parse(text)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// 参照している列名（小文字）
    pub fn referenced_columns(&self) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        self.root.visit(&mut |e| {
            if let Expr::Column(name) = e {
                columns.insert(name.to_lowercase());
            }
        });
        columns
    }

    /// ジオメトリ変数（`$area` など）を参照しているか
    pub fn needs_geometry(&self) -> bool {
        let mut needs = false;
        self.root.visit(&mut |e| {
            if let Expr::Variable(var) = e {
                needs |= var.needs_geometry();
            }
        });
        needs
    }

    /// スキーマにない列を参照していればエラー
    pub fn prepare(&self, fields: &Fields) -> Result<()> {
        match self
            .referenced_columns()
            .into_iter()
            .find(|name| fields.index_of(name).is_none())
        {
            Some(name) => Err(DmError::Predicate(format!(
                "column '{}' not found in '{}'",
                name, self.text
            ))),
            None => Ok(()),
        }
    }

    pub fn evaluate(&self, ctx: &dyn FeatureContext) -> Result<Value> {
        eval::evaluate(&self.root, ctx)
    }

    /// 真の場合のみ一致。NULL は不一致
    pub fn matches(&self, ctx: &dyn FeatureContext) -> Result<bool> {
        eval::truthy(&self.evaluate(ctx)?)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
