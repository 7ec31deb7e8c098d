use crate::decode_column::{ColumnMetadata, decode_column};
use convert_case::{Case, Casing};
use quote::ToTokens;
use syn::{Fields, Ident, ItemStruct, LitStr, parse::ParseBuffer};

pub(crate) const PROCESSORS: [(&str, &str); 7] = [
    ("before_insert", "BeforeInsertProcessor"),
    ("after_insert", "AfterInsertProcessor"),
    ("before_update", "BeforeUpdateProcessor"),
    ("after_update", "AfterUpdateProcessor"),
    ("before_delete", "BeforeDeleteProcessor"),
    ("after_delete", "AfterDeleteProcessor"),
    ("after_load", "AfterLoadProcessor"),
];

pub(crate) struct TableMetadata {
    pub(crate) columns: Vec<ColumnMetadata>,
    pub(crate) name: String,
    pub(crate) processors: Vec<Ident>,
}

pub fn decode_table(item: &ItemStruct) -> TableMetadata {
    let Fields::Named(fields) = &item.fields else {
        panic!("Bean can only be derived on structs with named fields");
    };
    let columns = fields
        .named
        .iter()
        .enumerate()
        .map(|(i, f)| decode_column(i, f))
        .collect();
    let mut name = item.ident.to_string().to_case(Case::Snake);
    if name.starts_with('_') {
        name.remove(0);
    }
    let mut processors = Vec::new();
    for attr in &item.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("silo") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `silo`, use it like: `#[silo(attribute = value, ..)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("table") || arg.path.is_ident("name") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `table`, use it like: `#[silo(table = \"my_table\")]`");
                };
                name = value.value();
            } else if arg.path.is_ident("processors") {
                arg.parse_nested_meta(|stage| {
                    let Some(ident) = stage.path.get_ident() else {
                        panic!("Error while parsing `processors`, use it like: `#[silo(processors(after_load, before_insert))]`");
                    };
                    if !PROCESSORS.iter().any(|(v, _)| *ident == *v) {
                        panic!(
                            "Unknown processor `{}`, expected one of: {}",
                            ident,
                            PROCESSORS.map(|(v, _)| v).join(", ")
                        );
                    }
                    processors.push(ident.clone());
                    Ok(())
                })?;
            } else {
                panic!(
                    "Unknown attribute `{}` inside silo macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    TableMetadata {
        columns,
        name,
        processors,
    }
}
