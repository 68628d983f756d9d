// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Selector evaluation against an envelope.
//!
//! Comparisons that cannot be decided (missing property, incompatible
//! operand types) are false instead of failing the whole delivery.

use std::cmp::Ordering;

use super::parser::{Expression, Operand, Operator};
use crate::message::{Envelope, PropertyValue};

/// Header field names addressable from a selector.
const FIELD_SUBJECT: &str = "subject";
const FIELD_CREATION_TIME: &str = "creation_time";

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

pub(super) fn evaluate(expression: &Expression, envelope: &Envelope) -> bool {
    match expression {
        Expression::Compare { left, op, right } => {
            match (resolve(left, envelope), resolve(right, envelope)) {
                (Some(l), Some(r)) => compare(&l, *op, &r),
                _ => false,
            }
        }
        Expression::And(l, r) => evaluate(l, envelope) && evaluate(r, envelope),
        Expression::Or(l, r) => evaluate(l, envelope) || evaluate(r, envelope),
        Expression::Not(inner) => !evaluate(inner, envelope),
    }
}

fn resolve(operand: &Operand, envelope: &Envelope) -> Option<Value> {
    match operand {
        Operand::Integer(v) => Some(Value::Integer(*v)),
        Operand::Float(v) => Some(Value::Float(*v)),
        Operand::String(v) => Some(Value::Text(v.clone())),
        Operand::Boolean(v) => Some(Value::Boolean(*v)),
        Operand::Identifier(name) => match name.as_str() {
            FIELD_SUBJECT => Some(Value::Text(envelope.subject.clone())),
            FIELD_CREATION_TIME => Some(Value::Integer(envelope.creation_time_ms)),
            _ => envelope.property(name).map(property_value),
        },
    }
}

fn property_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Bool(b) => Value::Boolean(*b),
        PropertyValue::String(s) => Value::Text(s.clone()),
        other => Value::Integer(other.as_i64().unwrap_or_default()),
    }
}

fn compare(left: &Value, op: Operator, right: &Value) -> bool {
    if op == Operator::Like {
        return match (left, right) {
            (Value::Text(text), Value::Text(pattern)) => like(text, pattern),
            _ => false,
        };
    }

    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => {
            return match op {
                Operator::Eq => a == b,
                Operator::Ne => a != b,
                _ => false,
            }
        }
        _ => None,
    };

    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Like => false,
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // Iterative matcher with single-star backtracking.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::selector::Selector;

    fn eval(source: &str, envelope: &Envelope) -> bool {
        Selector::parse(source).unwrap().matches(envelope)
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("cpm", "cpm"));
        assert!(like("cpm", "c%"));
        assert!(like("cpm", "%m"));
        assert!(like("cpm", "_p_"));
        assert!(like("", "%"));
        assert!(like("station-101-obu", "%101%"));
        assert!(!like("cam", "c_"));
        assert!(!like("vam", "c%"));
    }

    #[test]
    fn test_numeric_comparisons() {
        let env = Envelope::for_message(MessageType::Cam, 500, None, vec![]);
        assert!(eval("station_id > 100", &env));
        assert!(eval("station_id >= 500.0", &env));
        assert!(eval("station_id < 500.5", &env));
        assert!(!eval("station_id <> 500", &env));
        assert!(eval("mid = 2049 OR mid = 2050", &env));
        assert!(eval("creation_time > 0", &env));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let env = Envelope::for_message(MessageType::Cam, 1, None, vec![]);
        assert!(!eval("subject = 2050", &env));
        assert!(!eval("mid LIKE '20%'", &env));
        assert!(!eval("TRUE < FALSE", &env));
        assert!(eval("TRUE <> FALSE", &env));
    }
}
