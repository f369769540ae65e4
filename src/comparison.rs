use std::cmp::Ordering;

use crate::value::HostValue;

pub fn cmp_values<F>(a: &HostValue, b: &HostValue, pred_on_ord: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    pred_on_ord(order_values(a, b))
}

/// Total order used by filters: numbers numerically, strings lexically,
/// numeric strings against numbers numerically, everything else by text.
pub fn order_values(a: &HostValue, b: &HostValue) -> Ordering {
    match (a.unwrapped(), b.unwrapped()) {
        (HostValue::Str(sa), HostValue::Str(sb)) => sa.cmp(sb),
        (HostValue::Int(ia), HostValue::Int(ib)) => ia.cmp(ib),
        (HostValue::Bool(ba), HostValue::Bool(bb)) => ba.cmp(bb),
        (HostValue::Nil, HostValue::Nil) => Ordering::Equal,
        (x, y) => match (as_number(x), as_number(y)) {
            (Some(da), Some(db)) => cmp_floats(da, db),
            _ => a.to_text().cmp(&b.to_text()),
        },
    }
}

fn as_number(v: &HostValue) -> Option<f64> {
    match v {
        HostValue::Int(i) => Some(*i as f64),
        HostValue::Float(f) => Some(*f),
        HostValue::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn cmp_floats(da: f64, db: f64) -> Ordering {
    if (da - db).abs() < f64::EPSILON {
        Ordering::Equal
    } else if da < db {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numeric_ordering() {
        assert_eq!(
            order_values(&HostValue::Int(3), &HostValue::Float(3.0)),
            Ordering::Equal
        );
        assert_eq!(
            order_values(&HostValue::from("10"), &HostValue::Int(9)),
            Ordering::Greater
        );
        assert!(cmp_values(&HostValue::from("a"), &HostValue::from("b"), |o| o
            .is_lt()));
    }

    #[test]
    fn nil_sorts_by_text() {
        assert_eq!(
            order_values(&HostValue::Nil, &HostValue::from("x")),
            Ordering::Less
        );
    }
}
