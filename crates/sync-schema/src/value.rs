/// A dynamic scalar as produced by the Row Source for one [`crate::Column`]
/// and consumed at the sink boundary, per spec.md §9 Design Notes.
///
/// NULL database values are represented by `Null`, which downstream
/// serializes to a zero-equivalent rather than failing — see
/// `sync_source::decode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    I64(i64),
    U64(u64),
    Str(String),
    Null,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Render this value as a SQL literal for inlining into a generated
    /// query (only ever used for the join-key lookup in `main_ids_for_join_key`,
    /// which quotes string-typed columns and leaves integral ones bare).
    pub fn to_sql_literal(&self, quote: bool) -> String {
        match self {
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::Str(v) if quote => format!("'{}'", v.replace('\'', "''")),
            Value::Str(v) => v.clone(),
            Value::Null => "NULL".to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Null => write!(f, ""),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::I64(n) => serde_json::Value::from(*n),
            Value::U64(n) => serde_json::Value::from(*n),
            Value::Str(s) => serde_json::Value::from(s.clone()),
            Value::Null => serde_json::Value::Null,
        }
    }
}
