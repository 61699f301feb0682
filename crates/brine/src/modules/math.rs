//! Integer and fraction arithmetic.
//!
//! Integers are arbitrary-precision: the i64 fast path promotes to a big
//! integer on overflow instead of wrapping. Division and modulo use floor
//! semantics. Fractions are `(numerator denominator)` vecs kept in lowest
//! terms with a positive denominator.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::{
    error::{RunError, RunResult},
    natives::{ModuleBuilder, pop2},
    value::{Value, render_source},
};

pub(crate) fn module() -> ModuleBuilder {
    let mut m = ModuleBuilder::new("math");

    m.register_simple("<", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let ordering = compare(&x, &y)?;
        Ok(rest.push(Value::bool_atom(ordering.is_lt())))
    });
    m.register_simple(">", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let ordering = compare(&x, &y)?;
        Ok(rest.push(Value::bool_atom(ordering.is_gt())))
    });
    let ge = m.register_simple(">=", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let ordering = compare(&x, &y)?;
        Ok(rest.push(Value::bool_atom(ordering.is_ge())))
    });
    m.add("≥", ge);
    let le = m.register_simple("<=", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let ordering = compare(&x, &y)?;
        Ok(rest.push(Value::bool_atom(ordering.is_le())))
    });
    m.add("≤", le);

    m.register_simple("+", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(add(&x, &y)?))
    });
    m.register_simple("-", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(sub(&x, &y)?))
    });
    m.register_simple("*", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(mul(&x, &y)?))
    });
    m.register_simple("/", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(floor_div(&x, &y)?))
    });
    m.register_simple("%", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        Ok(rest.push(floor_mod(&x, &y)?))
    });

    m.register_simple("%make", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let n = as_bigint(&x).ok_or_else(|| not_ints(&x, &y))?;
        let d = as_bigint(&y).ok_or_else(|| not_ints(&x, &y))?;
        if d.is_zero() {
            return Err(RunError::arithmetic_error(format!(
                "construction of a zero-denominator fraction: {n} 0 %make"
            )));
        }
        Ok(rest.push(make_fraction(n, d)))
    });
    m.register_simple("%+", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let (xn, xd) = read_fraction(&x)?;
        let (yn, yd) = read_fraction(&y)?;
        Ok(rest.push(make_fraction(&xn * &yd + &xd * &yn, xd * yd)))
    });
    m.register_simple("%-", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let (xn, xd) = read_fraction(&x)?;
        let (yn, yd) = read_fraction(&y)?;
        Ok(rest.push(make_fraction(&xn * &yd - &xd * &yn, xd * yd)))
    });
    m.register_simple("%*", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let (xn, xd) = read_fraction(&x)?;
        let (yn, yd) = read_fraction(&y)?;
        Ok(rest.push(make_fraction(xn * yn, xd * yd)))
    });
    m.register_simple("%/", |stack| {
        let (y, x, rest) = pop2(&stack)?;
        let (xn, xd) = read_fraction(&x)?;
        let (yn, yd) = read_fraction(&y)?;
        if yn.is_zero() {
            return Err(RunError::arithmetic_error(format!(
                "division by zero: {} {} %/",
                render_source(&x),
                render_source(&y)
            )));
        }
        Ok(rest.push(make_fraction(xn * yd, xd * yn)))
    });

    m
}

fn as_bigint(value: &Value) -> Option<BigInt> {
    match value {
        Value::Int(n) => Some(BigInt::from(*n)),
        Value::BigInt(n) => Some((**n).clone()),
        _ => None,
    }
}

fn not_ints(x: &Value, y: &Value) -> RunError {
    RunError::type_error(format!(
        "{} and {} are not both ints",
        render_source(x),
        render_source(y)
    ))
}

fn compare(x: &Value, y: &Value) -> RunResult<std::cmp::Ordering> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        _ => {
            let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
            let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
            Ok(a.cmp(&b))
        }
    }
}

fn add(x: &Value, y: &Value) -> RunResult<Value> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_add(*b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::from_bigint(BigInt::from(*a) + b))),
        _ => {
            let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
            let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
            Ok(Value::from_bigint(a + b))
        }
    }
}

fn sub(x: &Value, y: &Value) -> RunResult<Value> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_sub(*b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::from_bigint(BigInt::from(*a) - b))),
        _ => {
            let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
            let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
            Ok(Value::from_bigint(a - b))
        }
    }
}

fn mul(x: &Value, y: &Value) -> RunResult<Value> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_mul(*b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::from_bigint(BigInt::from(*a) * b))),
        _ => {
            let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
            let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
            Ok(Value::from_bigint(a * b))
        }
    }
}

fn floor_div(x: &Value, y: &Value) -> RunResult<Value> {
    let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
    let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
    if b.is_zero() {
        return Err(RunError::arithmetic_error(format!("division by zero: {a} 0 /")));
    }
    Ok(Value::from_bigint(a.div_floor(&b)))
}

fn floor_mod(x: &Value, y: &Value) -> RunResult<Value> {
    let a = as_bigint(x).ok_or_else(|| not_ints(x, y))?;
    let b = as_bigint(y).ok_or_else(|| not_ints(x, y))?;
    if b.is_zero() {
        return Err(RunError::arithmetic_error(format!("division by zero: {a} 0 %")));
    }
    Ok(Value::from_bigint(a.mod_floor(&b)))
}

/// Builds a fraction vec in lowest terms with a positive denominator.
fn make_fraction(numerator: BigInt, denominator: BigInt) -> Value {
    let gcd = numerator.gcd(&denominator);
    let (mut n, mut d) = if gcd.is_zero() {
        (numerator, denominator)
    } else {
        (numerator / &gcd, denominator / &gcd)
    };
    if d.is_negative() {
        n = -n;
        d = -d;
    }
    Value::vec(vec![Value::from_bigint(n), Value::from_bigint(d)])
}

/// Reads an int (as `n/1`) or an `(n d)` vec as a fraction.
fn read_fraction(value: &Value) -> RunResult<(BigInt, BigInt)> {
    if let Some(n) = as_bigint(value) {
        return Ok((n, BigInt::from(1)));
    }
    if let Value::Vec(parts) = value {
        if parts.len() == 2 {
            if let (Some(n), Some(d)) = (as_bigint(&parts[0]), as_bigint(&parts[1])) {
                if d.is_zero() {
                    return Err(RunError::arithmetic_error(format!(
                        "{} has a zero denominator",
                        render_source(value)
                    )));
                }
                return Ok((n, d));
            }
        }
    }
    Err(RunError::type_error(format!(
        "{} is not a fraction",
        render_source(value)
    )))
}
