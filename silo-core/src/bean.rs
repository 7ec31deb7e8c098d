use crate::{
    ColumnDescriptor, ColumnsSchema, Error, Hooks, PrimaryKey, Result, Row, ScanContext,
    TableDescriptor, Value,
};
use anyhow::Context;

/// Schema description and field access of a struct mapped to a table.
///
/// Implemented by `#[derive(Bean)]`. Fields are addressed by path: the position of the
/// field in the struct followed, for `#[silo(extends)]` embeddings, by the path inside the
/// embedded bean.
pub trait Bean: Default + Clone + Send + Sync + 'static {
    fn describe() -> TableDescriptor;

    fn set_field(
        &mut self,
        path: &[usize],
        value: Value,
        column: &ColumnDescriptor,
        context: &ScanContext,
    ) -> Result<()>;

    fn field_value(
        &self,
        path: &[usize],
        column: &ColumnDescriptor,
        context: &ScanContext,
    ) -> Result<Value>;

    fn hooks() -> Hooks<Self> {
        Hooks::NONE
    }
}

/// Error for a field path the bean does not have, used by the generated accessors.
pub fn unknown_field<T>(path: &[usize]) -> Error {
    let error = Error::msg(format!(
        "{} has no field at path {:?}",
        std::any::type_name::<T>(),
        path
    ));
    log::error!("{:#}", error);
    error
}

/// Fresh bean filled with the bound columns of one row.
pub fn bean_from_row<T: Bean>(
    values: Row,
    schema: &ColumnsSchema,
    context: &ScanContext,
) -> Result<T> {
    let Some(table) = &schema.table else {
        return Err(Error::msg(format!(
            "No table descriptor was resolved for {}",
            std::any::type_name::<T>()
        )));
    };
    let mut bean = T::default();
    for (field, value) in schema.fields.iter().zip(values.into_vec()) {
        let Some(idx) = field.column else {
            continue;
        };
        let column = &table.columns[idx];
        bean.set_field(&column.field_path, value, column, context)
            .with_context(|| {
                format!(
                    "While decoding column `{}` into {}",
                    field.name, table.type_name
                )
            })?;
    }
    Ok(bean)
}

/// Primary key of a bean, normalized the same way ids read from the database are.
pub fn bean_primary_key<T: Bean>(
    bean: &T,
    table: &TableDescriptor,
    context: &ScanContext,
) -> Result<PrimaryKey> {
    if !table.has_primary_key() {
        return Err(Error::msg(format!(
            "Table `{}` ({}) has no primary key",
            table.name, table.type_name
        )));
    }
    table
        .primary_key_columns()
        .map(|column| column.convert_id(bean.field_value(&column.field_path, column, context)?))
        .collect::<Result<Vec<_>>>()
        .map(PrimaryKey::new)
}

/// Value of every column of the bean, in descriptor order.
pub fn bean_values<T: Bean>(
    bean: &T,
    table: &TableDescriptor,
    context: &ScanContext,
) -> Result<Vec<Value>> {
    table
        .columns
        .iter()
        .map(|column| {
            bean.field_value(&column.field_path, column, context)
                .with_context(|| {
                    format!(
                        "While encoding column `{}` of {}",
                        column.name, table.type_name
                    )
                })
        })
        .collect()
}
