use crate::catalog::types::{ColumnType, ValueType};
use serde::{Deserialize, Serialize};

/// Tables backing an object type carry this prefix.
pub const OBJECT_TABLE_PREFIX: &str = "class_";

/// Name of the single column of a table backing a list of scalars.
pub const LIST_VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            col_type: ColumnType::Scalar(value_type),
            nullable: false,
        }
    }

    pub fn link_list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: ColumnType::LinkList {
                target: target.into(),
            },
            nullable: false,
        }
    }

    /// A list of scalars; `nullable` applies to the elements.
    pub fn list(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            col_type: ColumnType::List(value_type),
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn scalar_type(&self) -> Option<ValueType> {
        match self.col_type {
            ColumnType::Scalar(value_type) => Some(value_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// Schema of the hidden table behind a list of scalars.
    pub(crate) fn for_list(table_name: String, value_type: ValueType, nullable: bool) -> Self {
        let mut column = ColumnDef::scalar(LIST_VALUE_COLUMN, value_type);
        column.nullable = nullable;
        Self {
            table_name,
            columns: vec![column],
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub column_index: usize,
}

/// Object-level view of a table whose name carries [`OBJECT_TABLE_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub table_name: String,
    pub properties: Vec<Property>,
}

impl ObjectSchema {
    pub fn from_table(schema: &TableSchema) -> Option<Self> {
        let name = object_type_for_table_name(&schema.table_name)?;
        let properties = schema
            .columns
            .iter()
            .enumerate()
            .map(|(column_index, column)| Property {
                name: column.name.clone(),
                col_type: column.col_type.clone(),
                nullable: column.nullable,
                column_index,
            })
            .collect();
        Some(Self {
            name: name.to_string(),
            table_name: schema.table_name.clone(),
            properties,
        })
    }

    pub fn property_for_name(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

pub fn object_type_for_table_name(table_name: &str) -> Option<&str> {
    table_name.strip_prefix(OBJECT_TABLE_PREFIX)
}

pub fn table_name_for_object_type(object_type: &str) -> String {
    format!("{OBJECT_TABLE_PREFIX}{object_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_names_round_trip_through_table_names() {
        let table = table_name_for_object_type("Dog");
        assert_eq!(table, "class_Dog");
        assert_eq!(object_type_for_table_name(&table), Some("Dog"));
        assert_eq!(object_type_for_table_name("Dog"), None);
    }

    #[test]
    fn object_schema_only_for_class_tables() {
        let schema = TableSchema::new(
            "class_Person",
            vec![
                ColumnDef::scalar("name", ValueType::String),
                ColumnDef::link_list("dogs", "class_Dog"),
                ColumnDef::list("scores", ValueType::Int).nullable(),
            ],
        );
        let object = ObjectSchema::from_table(&schema).expect("object schema");
        assert_eq!(object.name, "Person");
        let scores = object.property_for_name("scores").expect("scores");
        assert_eq!(scores.column_index, 2);
        assert!(scores.nullable);

        let hidden = TableSchema::for_list("list".into(), ValueType::Int, false);
        assert!(ObjectSchema::from_table(&hidden).is_none());
    }
}
