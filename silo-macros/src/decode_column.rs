use quote::ToTokens;
use syn::{
    Field, GenericArgument, Ident, LitStr, PathArguments, Type, ext::IdentExt, parse::ParseBuffer,
};

/// How a field is read from and written to its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Through `FromColumn` and `IntoColumn`.
    Column,
    Json,
    Conversion,
    /// Embedded bean whose columns belong to the outer table.
    Extends,
    Skip,
}

pub(crate) struct ColumnMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) access: Access,
    pub(crate) sql_type: Option<String>,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: bool,
    pub(crate) deleted: bool,
    pub(crate) version: bool,
    pub(crate) time_zone: Option<String>,
}

fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    path.path.segments.last().is_some_and(|v| {
        v.ident == "Option"
            && matches!(&v.arguments, PathArguments::AngleBracketed(args)
                if matches!(args.args.first(), Some(GenericArgument::Type(..))))
    })
}

impl ColumnMetadata {
    pub(crate) fn nullable(&self) -> bool {
        !self.primary_key && is_option(&self.ty)
    }
}

fn set_access(metadata: &mut ColumnMetadata, access: Access) {
    if metadata.access != Access::Column {
        panic!(
            "Field `{}` can be only one of `json`, `conversion`, `extends` or `skip`",
            metadata.ident
        );
    }
    metadata.access = access;
}

pub fn decode_column(index: usize, field: &Field) -> ColumnMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Bean fields are expected to have a name");
    let mut name = ident.unraw().to_string();
    if name.starts_with('_') {
        name.remove(0);
    }
    let mut metadata = ColumnMetadata {
        ident,
        ty: field.ty.clone(),
        index,
        name,
        access: Access::Column,
        sql_type: None,
        primary_key: false,
        auto_increment: false,
        deleted: false,
        version: false,
        time_zone: None,
    };
    for attr in &field.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("silo") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `silo`, use it like: `#[silo(attribute = value, ...)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            let flag = |what: &str| {
                if arg.input.peek(syn::Token![=]) {
                    panic!("Error while parsing `{what}`, use it like: `#[silo({what})]`");
                }
            };
            if arg.path.is_ident("name") {
                let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `name`, use it like: `#[silo(name = \"my_column\")]`");
                };
                metadata.name = v.value();
            } else if arg.path.is_ident("sql_type") {
                let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `sql_type`, use it like: `#[silo(sql_type = \"VARCHAR\")]`");
                };
                metadata.sql_type = Some(v.value());
            } else if arg.path.is_ident("time_zone") {
                let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `time_zone`, use it like: `#[silo(time_zone = \"+02:00\")]`");
                };
                metadata.time_zone = Some(v.value());
            } else if arg.path.is_ident("pk") || arg.path.is_ident("primary_key") {
                flag("pk");
                metadata.primary_key = true;
            } else if arg.path.is_ident("auto_increment") || arg.path.is_ident("autoincr") {
                flag("auto_increment");
                metadata.auto_increment = true;
            } else if arg.path.is_ident("deleted") {
                flag("deleted");
                metadata.deleted = true;
            } else if arg.path.is_ident("version") {
                flag("version");
                metadata.version = true;
            } else if arg.path.is_ident("json") {
                flag("json");
                set_access(&mut metadata, Access::Json);
            } else if arg.path.is_ident("conversion") {
                flag("conversion");
                set_access(&mut metadata, Access::Conversion);
            } else if arg.path.is_ident("extends") {
                flag("extends");
                set_access(&mut metadata, Access::Extends);
            } else if arg.path.is_ident("skip") {
                flag("skip");
                set_access(&mut metadata, Access::Skip);
            } else {
                panic!(
                    "Unknown attribute `{}` inside silo macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    if metadata.access == Access::Extends
        && (metadata.primary_key || metadata.deleted || metadata.version || metadata.sql_type.is_some())
    {
        panic!(
            "Field `{}` is an embedded bean, its own fields carry the column attributes",
            metadata.ident
        );
    }
    metadata
}
