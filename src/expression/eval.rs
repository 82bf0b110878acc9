use std::cmp::Ordering;

use geo::{Area, Euclidean, Length};
use geo_types::Geometry;

use crate::error::{DmError, Result};

use super::{BinaryOp, Expr, FeatureContext, Function, Value, Variable};

pub(super) fn evaluate(expr: &Expr, ctx: &dyn FeatureContext) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Column(name) => Ok(ctx.attribute(name).into()),
        Expr::Variable(var) => Ok(variable(*var, ctx)),
        Expr::Not(inner) => match to_bool(&evaluate(inner, ctx)?)? {
            Some(b) => Ok(Value::Bool(!b)),
            None => Ok(Value::Null),
        },
        Expr::Negate(inner) => match evaluate(inner, ctx)? {
            Value::Null => Ok(Value::Null),
            Value::Int(v) => Ok(v.checked_neg().map_or(Value::Double(-(v as f64)), Value::Int)),
            other => Ok(Value::Double(-to_number(&other)?)),
        },
        Expr::Binary { op, left, right } => binary(*op, left, right, ctx),
        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, ctx)? == Value::Null;
            Ok(Value::Bool(is_null != *negated))
        }
        Expr::In {
            expr,
            list,
            negated,
        } => {
            let value = evaluate(expr, ctx)?;
            if value == Value::Null {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                match compare(&value, &evaluate(item, ctx)?)? {
                    Some(Ordering::Equal) => return Ok(Value::Bool(!*negated)),
                    Some(_) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                Ok(Value::Null)
            } else {
                Ok(Value::Bool(*negated))
            }
        }
        Expr::Like {
            expr,
            pattern,
            case_insensitive,
            negated,
        } => {
            let (value, pattern) = (evaluate(expr, ctx)?, evaluate(pattern, ctx)?);
            if value == Value::Null || pattern == Value::Null {
                return Ok(Value::Null);
            }
            let (mut text, mut pattern) = (value.to_string(), pattern.to_string());
            if *case_insensitive {
                text = text.to_lowercase();
                pattern = pattern.to_lowercase();
            }
            Ok(Value::Bool(like(&text, &pattern) != *negated))
        }
        Expr::Function { function, args } => call(*function, args, ctx),
    }
}

/// 条件式の結果を一致判定に変換する
pub(super) fn truthy(value: &Value) -> Result<bool> {
    Ok(to_bool(value)?.unwrap_or(false))
}

fn to_bool(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Int(v) => Ok(Some(*v != 0)),
        Value::Double(v) => Ok(Some(*v != 0.0)),
        Value::Text(t) => Err(DmError::Predicate(format!(
            "cannot convert '{}' to boolean",
            t
        ))),
    }
}

fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Double(v) => Ok(*v),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(t) => t
            .trim()
            .parse()
            .map_err(|_| DmError::Predicate(format!("cannot convert '{}' to number", t))),
        Value::Null => Err(DmError::Predicate("unexpected NULL".to_string())),
    }
}

fn variable(var: Variable, ctx: &dyn FeatureContext) -> Value {
    if var == Variable::Id {
        return Value::Int(ctx.feature_id() as i64);
    }
    let Some(geometry) = ctx.geometry() else {
        return Value::Null;
    };
    match (var, geometry) {
        (Variable::Area, g) => Value::Double(g.unsigned_area()),
        (Variable::Length, Geometry::LineString(ls)) => Value::Double(ls.length::<Euclidean>()),
        (Variable::Length, Geometry::MultiLineString(mls)) => {
            Value::Double(mls.length::<Euclidean>())
        }
        (Variable::X, Geometry::Point(p)) => Value::Double(p.x()),
        (Variable::Y, Geometry::Point(p)) => Value::Double(p.y()),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &dyn FeatureContext) -> Result<Value> {
    match op {
        BinaryOp::And => {
            let l = to_bool(&evaluate(left, ctx)?)?;
            if l == Some(false) {
                return Ok(Value::Bool(false));
            }
            let r = to_bool(&evaluate(right, ctx)?)?;
            Ok(match (l, r) {
                (_, Some(false)) => Value::Bool(false),
                (Some(true), Some(true)) => Value::Bool(true),
                _ => Value::Null,
            })
        }
        BinaryOp::Or => {
            let l = to_bool(&evaluate(left, ctx)?)?;
            if l == Some(true) {
                return Ok(Value::Bool(true));
            }
            let r = to_bool(&evaluate(right, ctx)?)?;
            Ok(match (l, r) {
                (_, Some(true)) => Value::Bool(true),
                (Some(false), Some(false)) => Value::Bool(false),
                _ => Value::Null,
            })
        }
        _ => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            if l == Value::Null || r == Value::Null {
                return Ok(Value::Null);
            }
            match op {
                BinaryOp::Eq => Ok(Value::Bool(compare(&l, &r)? == Some(Ordering::Equal))),
                BinaryOp::Ne => Ok(Value::Bool(compare(&l, &r)? != Some(Ordering::Equal))),
                BinaryOp::Lt => Ok(Value::Bool(compare(&l, &r)? == Some(Ordering::Less))),
                BinaryOp::Le => Ok(Value::Bool(matches!(
                    compare(&l, &r)?,
                    Some(Ordering::Less | Ordering::Equal)
                ))),
                BinaryOp::Gt => Ok(Value::Bool(compare(&l, &r)? == Some(Ordering::Greater))),
                BinaryOp::Ge => Ok(Value::Bool(matches!(
                    compare(&l, &r)?,
                    Some(Ordering::Greater | Ordering::Equal)
                ))),
                BinaryOp::Concat => Ok(Value::Text(format!("{}{}", l, r))),
                _ => arithmetic(op, &l, &r),
            }
        }
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if op == BinaryOp::Add {
        if let (Value::Text(a), Value::Text(b)) = (l, r) {
            return Ok(Value::Text(format!("{}{}", a, b)));
        }
    }

    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Mod if b == 0 => return Ok(Value::Null),
            BinaryOp::Mod => a.checked_rem(b),
            // 除算は常に実数
            _ => None,
        };
        if let Some(v) = result {
            return Ok(Value::Int(v));
        }
    }

    let (a, b) = (to_number(l)?, to_number(r)?);
    Ok(match op {
        BinaryOp::Add => Value::Double(a + b),
        BinaryOp::Sub => Value::Double(a - b),
        BinaryOp::Mul => Value::Double(a * b),
        BinaryOp::Div if b == 0.0 => Value::Null,
        BinaryOp::Div => Value::Double(a / b),
        BinaryOp::Mod if b == 0.0 => Value::Null,
        BinaryOp::Mod => Value::Double(a % b),
        _ => return Err(DmError::Predicate(format!("unsupported operator {:?}", op))),
    })
}

/// NULL を含む場合と比較不能な実数は `None`。数値と文字列は文字列側が数値に変換できれば数値比較
fn compare(l: &Value, r: &Value) -> Result<Option<Ordering>> {
    let ordering = match (l, r) {
        (Value::Null, _) | (_, Value::Null) => return Ok(None),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Text(t), other) | (other, Value::Text(t)) => {
            let text_on_left = matches!(l, Value::Text(_));
            let ordering = match t.trim().parse::<f64>() {
                Ok(n) => n.partial_cmp(&to_number(other)?),
                Err(_) => Some(t.as_str().cmp(other.to_string().as_str())),
            };
            // 常に (l, r) の順序で返す
            if text_on_left {
                ordering
            } else {
                ordering.map(Ordering::reverse)
            }
        }
        _ => to_number(l)?.partial_cmp(&to_number(r)?),
    };
    Ok(ordering)
}

/// `%` は任意の文字列、`_` は任意の1文字
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // 動的計画法: matched[j] = pattern[..i] が text[..j] に一致するか
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for &p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut any = false;
                for j in 0..=text.len() {
                    any |= matched[j];
                    next[j] = any;
                }
            }
            _ => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && (p == '_' || p == text[j - 1]);
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

fn call(function: Function, args: &[Expr], ctx: &dyn FeatureContext) -> Result<Value> {
    if function == Function::Coalesce {
        for arg in args {
            let value = evaluate(arg, ctx)?;
            if value != Value::Null {
                return Ok(value);
            }
        }
        return Ok(Value::Null);
    }

    let Some(arg) = args.first() else {
        return Err(DmError::Predicate(format!("{:?} needs an argument", function)));
    };
    let value = evaluate(arg, ctx)?;
    if value == Value::Null {
        return Ok(Value::Null);
    }
    Ok(match function {
        Function::Lower => Value::Text(value.to_string().to_lowercase()),
        Function::Upper => Value::Text(value.to_string().to_uppercase()),
        Function::Length => Value::Int(value.to_string().chars().count() as i64),
        Function::Abs => match value {
            Value::Int(v) => v.checked_abs().map_or(Value::Double((v as f64).abs()), Value::Int),
            other => Value::Double(to_number(&other)?.abs()),
        },
        Function::Coalesce => value,
    })
}
