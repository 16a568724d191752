use crate::catalog::schema::{ObjectSchema, Property};
use crate::catalog::types::{ColumnType, Value};
use crate::error::CollectionError;
use crate::list::List;
use crate::projection::{Projection, check_column};
use crate::session::Session;
use crate::storage::{RowRef, TableRef};
use std::fmt;

/// Accessor for one row of an object type's table.
#[derive(Clone)]
pub struct Object {
    session: Session,
    row: RowRef,
    schema: ObjectSchema,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.schema.name)
            .field("row", &self.row)
            .finish()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row
    }
}

impl Object {
    /// Appends a new row holding column defaults.
    pub fn create(session: &Session, object_type: &str) -> Result<Self, CollectionError> {
        session.verify_handle()?;
        session.verify_in_transaction("create an object")?;
        let table = session.object_table(object_type)?;
        let index = table.add_empty_row()?;
        Self::from_row(session, table.row(index)?)
    }

    pub fn get(
        session: &Session,
        object_type: &str,
        index: usize,
    ) -> Result<Self, CollectionError> {
        session.verify_handle()?;
        let table = session.object_table(object_type)?;
        Self::from_row(session, table.row(index)?)
    }

    pub fn from_row(session: &Session, row: RowRef) -> Result<Self, CollectionError> {
        let table_schema = row.table().schema()?;
        let schema = ObjectSchema::from_table(&table_schema)
            .ok_or(CollectionError::TableNotFound(table_schema.table_name))?;
        Ok(Self {
            session: session.clone(),
            row,
            schema,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.row.is_attached()
    }

    pub fn row(&self) -> &RowRef {
        &self.row
    }

    pub fn table(&self) -> &TableRef {
        self.row.table()
    }

    pub fn object_schema(&self) -> &ObjectSchema {
        &self.schema
    }

    pub fn row_index(&self) -> Result<usize, CollectionError> {
        self.verify()?;
        self.row.index()
    }

    fn verify(&self) -> Result<(), CollectionError> {
        self.session.verify_handle()?;
        if !self.row.is_attached() {
            return Err(CollectionError::Invalidated);
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Result<&Property, CollectionError> {
        self.schema
            .property_for_name(name)
            .ok_or_else(|| CollectionError::ColumnNotFound {
                table: self.schema.table_name.clone(),
                column: name.to_string(),
            })
    }

    pub fn get_value(&self, property: &str) -> Result<Value, CollectionError> {
        self.verify()?;
        self.row.get(self.property(property)?.column_index)
    }

    pub fn get_property<T: Projection>(&self, property: &str) -> Result<T, CollectionError> {
        self.verify()?;
        let column = self.row.table().schema()?;
        let index = self.property(property)?.column_index;
        let def = column.column(index).ok_or(CollectionError::Invalidated)?;
        check_column::<T>(def)?;
        T::from_value(&self.row.get(index)?, property)
    }

    pub fn set_value(&self, property: &str, value: Value) -> Result<(), CollectionError> {
        self.verify()?;
        self.session.verify_in_transaction("set a property")?;
        self.row.set(self.property(property)?.column_index, value)
    }

    pub fn set_property<T: Projection>(
        &self,
        property: &str,
        value: T,
    ) -> Result<(), CollectionError> {
        self.verify()?;
        self.session.verify_in_transaction("set a property")?;
        let index = self.property(property)?.column_index;
        let schema = self.row.table().schema()?;
        check_column::<T>(schema.column(index).ok_or(CollectionError::Invalidated)?)?;
        self.row.set(index, value.into_value())
    }

    /// Live list stored in a link-list or scalar-list property.
    pub fn get_list(&self, property: &str) -> Result<List, CollectionError> {
        self.verify()?;
        let property = self.property(property)?;
        let index = self.row.index()?;
        match &property.col_type {
            ColumnType::LinkList { .. } => {
                let list = self.row.table().link_list(property.column_index, index)?;
                Ok(List::from_link_list(self.session.clone(), list))
            }
            ColumnType::List(_) => {
                let table = self.row.table().subtable(property.column_index, index)?;
                Ok(List::from_table(self.session.clone(), table))
            }
            ColumnType::Scalar(_) => Err(CollectionError::TypeMismatch {
                column: property.name.clone(),
                expected: "list".into(),
                actual: property.col_type.to_string(),
            }),
        }
    }

    /// Removes the row. Lists it owned, and links pointing at it, go with it.
    pub fn delete(&self) -> Result<(), CollectionError> {
        self.verify()?;
        self.session.verify_in_transaction("delete an object")?;
        self.row.table().remove_by_key(self.row.key())
    }
}
