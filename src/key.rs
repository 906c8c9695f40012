use std::fmt::Write;

/// One element of the material a key is built from.
///
/// Handlers are outcome callbacks that travel alongside identity data in
/// positional argument lists; they never contribute to the key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Handler,
    Seq(Vec<KeyPart>),
}

impl KeyPart {
    fn is_falsy(&self) -> bool {
        match self {
            KeyPart::Text(s) => s.is_empty(),
            KeyPart::Int(n) => *n == 0,
            KeyPart::Float(f) => *f == 0.0 || f.is_nan(),
            KeyPart::Bool(b) => !b,
            KeyPart::Null => true,
            KeyPart::Handler | KeyPart::Seq(_) => false,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            KeyPart::Text(s) => out.push_str(s),
            KeyPart::Int(n) => {
                let _ = write!(out, "{n}");
            }
            KeyPart::Float(f) => write_float(*f, out),
            KeyPart::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            KeyPart::Null | KeyPart::Handler => {}
            KeyPart::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_to(out);
                }
            }
        }
    }
}

fn write_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("NaN");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "Infinity" } else { "-Infinity" });
    } else if f == 0.0 {
        out.push('0');
    } else if f.abs() >= 1e21 || f.abs() < 1e-6 {
        // exponent form with an explicit sign, e.g. 1e+21
        let s = format!("{f:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => {
                let _ = write!(out, "{mantissa}e+{exp}");
            }
            _ => out.push_str(&s),
        }
    } else {
        let _ = write!(out, "{f}");
    }
}

/// Concatenates key material into a single string.
///
/// The first part always seeds the key, even when empty. Later parts are
/// skipped when falsy (empty text, zero, `false`, null) or when they are
/// handlers. A lone nested sequence is flattened one level, so
/// `build_key(&[Seq(parts)])` equals `build_key(&parts)`.
pub fn build_key(parts: &[KeyPart]) -> String {
    let parts = match parts {
        [KeyPart::Seq(inner)] => inner.as_slice(),
        _ => parts,
    };

    let mut key = String::new();
    let Some((first, rest)) = parts.split_first() else {
        return key;
    };
    first.write_to(&mut key);
    for part in rest {
        if matches!(part, KeyPart::Handler) || part.is_falsy() {
            continue;
        }
        part.write_to(&mut key);
    }
    key
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Text(s.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Text(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Text(s.clone())
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Int(n.into())
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(n.into())
    }
}

impl From<u64> for KeyPart {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => KeyPart::Int(n),
            Err(_) => KeyPart::Text(n.to_string()),
        }
    }
}

impl From<f64> for KeyPart {
    fn from(f: f64) -> Self {
        KeyPart::Float(f)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(KeyPart::Null, Into::into)
    }
}

impl<T: Into<KeyPart>> From<Vec<T>> for KeyPart {
    fn from(items: Vec<T>) -> Self {
        KeyPart::Seq(items.into_iter().map(Into::into).collect())
    }
}
