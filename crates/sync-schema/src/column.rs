use std::fmt;

/// The fixed type taxonomy a declared SQL column type is classified into.
///
/// Classification is a prefix match on the declared type string reported by
/// the server; see [`ColumnType::classify`]. `Unknown` is only a fatal error
/// once the column is actually referenced by a [`crate::Rule`] — see
/// [`crate::catalog::SchemaCatalog::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    BigInt,
    TinyInt,
    SmallInt,
    UnsignedSmallInt,
    UnsignedBigInt,
    Varchar,
    Text,
    Unknown,
}

impl ColumnType {
    /// Classify a declared SQL type string (e.g. `"int(11)"`,
    /// `"smallint(5) unsigned"`) by prefix match, in the exact order spec'd:
    /// more specific unsigned variants are checked before their signed
    /// prefix would otherwise match.
    pub fn classify(declared: &str) -> Self {
        let lower = declared.to_ascii_lowercase();
        if lower.starts_with("int(") {
            ColumnType::Int
        } else if lower.starts_with("tinyint(") {
            ColumnType::TinyInt
        } else if lower.starts_with("smallint(") && lower.contains("unsigned") {
            ColumnType::UnsignedSmallInt
        } else if lower.starts_with("smallint(") {
            ColumnType::SmallInt
        } else if lower.starts_with("bigint(") && lower.contains("unsigned") {
            ColumnType::UnsignedBigInt
        } else if lower.starts_with("bigint(") {
            ColumnType::BigInt
        } else if lower.starts_with("varchar(") {
            ColumnType::Varchar
        } else if lower.contains("text") {
            ColumnType::Text
        } else {
            ColumnType::Unknown
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ColumnType::Int
                | ColumnType::BigInt
                | ColumnType::TinyInt
                | ColumnType::SmallInt
                | ColumnType::UnsignedSmallInt
                | ColumnType::UnsignedBigInt
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, ColumnType::UnsignedSmallInt | ColumnType::UnsignedBigInt)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ColumnType::Varchar | ColumnType::Text)
    }
}

/// A single column of a [`crate::MainTable`] or [`crate::JoinTable`].
///
/// `qualified_name` is the column's stable identity across the whole
/// [`crate::Rule`] (`table.column`), used both to key [`crate::Row`] and to
/// render SQL. It never changes after [`crate::catalog::SchemaCatalog::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub table_name: String,
    pub ty: ColumnType,
    pub mapping_name: String,
}

impl Column {
    pub fn new(table_name: impl Into<String>, name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        let name = name.into();
        Self {
            mapping_name: name.clone(),
            table_name,
            name,
            ty: ColumnType::Unknown,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table_name, self.name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}
