use crate::{
    decode_column::{Access, ColumnMetadata},
    decode_table::{PROCESSORS, TableMetadata},
};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ItemStruct;

fn column_descriptor(column: &ColumnMetadata) -> TokenStream {
    let ty = &column.ty;
    let name = &column.name;
    let index = column.index;
    let sql_type = match (&column.sql_type, column.access) {
        (Some(v), _) => quote!(::silo::SqlType::parse(#v)),
        (None, Access::Json) => quote!(::silo::SqlType::Json),
        (None, Access::Conversion) => quote!(::silo::SqlType::Varchar),
        (None, _) => quote!(<#ty as ::silo::FromColumn>::SQL_TYPE),
    };
    let nullable = match column.access {
        Access::Column => quote!(<#ty as ::silo::FromColumn>::NULLABLE),
        _ => {
            let v = column.nullable();
            quote!(#v)
        }
    };
    let time_zone = match &column.time_zone {
        Some(v) => quote!(::silo::parse_offset(#v).ok()),
        None => quote!(None),
    };
    let primary_key = column.primary_key;
    let auto_increment = column.auto_increment;
    let deleted = column.deleted;
    let version = column.version;
    let json = column.access == Access::Json;
    quote! {
        ::silo::ColumnDescriptor {
            sql_type: #sql_type,
            nullable: !#primary_key && #nullable,
            primary_key: #primary_key,
            auto_increment: #auto_increment,
            deleted: #deleted,
            version: #version,
            json: #json,
            time_zone: #time_zone,
            ..::silo::ColumnDescriptor::new(#name, vec![#index])
        }
    }
}

pub(crate) fn bean_trait(item: &ItemStruct, table: &TableMetadata) -> TokenStream {
    let name = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    let type_name = name.to_string();
    let table_name = &table.name;
    let describe = table.columns.iter().filter_map(|column| {
        let ty = &column.ty;
        let index = column.index;
        Some(match column.access {
            Access::Skip => return None,
            Access::Extends => quote! {
                columns.extend(
                    <#ty as ::silo::Bean>::describe()
                        .columns
                        .iter()
                        .cloned()
                        .map(|v| v.nested(#index)),
                );
            },
            _ => {
                let descriptor = column_descriptor(column);
                quote!(columns.push(#descriptor);)
            }
        })
    });
    let set_field = table.columns.iter().filter_map(|column| {
        let ident = &column.ident;
        let ty = &column.ty;
        let index = column.index;
        Some(match column.access {
            Access::Skip => return None,
            Access::Column => quote! {
                [#index] => {
                    self.#ident = <#ty as ::silo::FromColumn>::from_column(value, column, context)?;
                    Ok(())
                }
            },
            Access::Json => quote! {
                [#index] => {
                    self.#ident = ::silo::from_json_column(value, context)?;
                    Ok(())
                }
            },
            Access::Conversion => quote! {
                [#index] => ::silo::from_conversion_column(&mut self.#ident, value),
            },
            Access::Extends => quote! {
                [#index, rest @ ..] => ::silo::Bean::set_field(&mut self.#ident, rest, value, column, context),
            },
        })
    });
    let field_value = table.columns.iter().filter_map(|column| {
        let ident = &column.ident;
        let index = column.index;
        Some(match column.access {
            Access::Skip => return None,
            Access::Column => quote! {
                [#index] => ::silo::IntoColumn::into_column(&self.#ident, column, context),
            },
            Access::Json => quote! {
                [#index] => ::silo::into_json_column(&self.#ident, column, context),
            },
            Access::Conversion => quote! {
                [#index] => ::silo::into_conversion_column(&self.#ident, column),
            },
            Access::Extends => quote! {
                [#index, rest @ ..] => ::silo::Bean::field_value(&self.#ident, rest, column, context),
            },
        })
    });
    let hooks = if table.processors.is_empty() {
        quote!()
    } else {
        let hooks = table.processors.iter().map(|stage| {
            let Some((_, processor)) = PROCESSORS.iter().find(|(v, _)| *stage == *v) else {
                unreachable!("processors are validated while decoding");
            };
            let processor = format_ident!("{}", processor);
            quote!(#stage: Some(<Self as ::silo::#processor>::#stage),)
        });
        quote! {
            fn hooks() -> ::silo::Hooks<Self> {
                ::silo::Hooks {
                    #(#hooks)*
                    ..::silo::Hooks::NONE
                }
            }
        }
    };
    quote! {
        impl #impl_generics ::silo::Bean for #name #ty_generics #where_clause {
            fn describe() -> ::silo::TableDescriptor {
                let mut columns: Vec<::silo::ColumnDescriptor> = Vec::new();
                #(#describe)*
                ::silo::TableDescriptor::new(#table_name, #type_name, columns)
            }

            fn set_field(
                &mut self,
                path: &[usize],
                value: ::silo::Value,
                column: &::silo::ColumnDescriptor,
                context: &::silo::ScanContext,
            ) -> ::silo::Result<()> {
                match path {
                    #(#set_field)*
                    _ => Err(::silo::unknown_field::<Self>(path)),
                }
            }

            fn field_value(
                &self,
                path: &[usize],
                column: &::silo::ColumnDescriptor,
                context: &::silo::ScanContext,
            ) -> ::silo::Result<::silo::Value> {
                match path {
                    #(#field_value)*
                    _ => Err(::silo::unknown_field::<Self>(path)),
                }
            }

            #hooks
        }

        impl #impl_generics ::silo::Element for #name #ty_generics #where_clause {
            fn shape(registry: &::silo::SchemaRegistry) -> ::silo::Shape {
                ::silo::bean_element::shape::<Self>(registry)
            }

            fn from_row(
                values: ::silo::Row,
                schema: &::silo::ColumnsSchema,
                context: &::silo::ScanContext,
            ) -> ::silo::Result<Self> {
                ::silo::bean_from_row(values, schema, context)
            }

            fn primary_key(
                &self,
                table: &::silo::TableDescriptor,
                context: &::silo::ScanContext,
            ) -> ::silo::Result<Option<::silo::PrimaryKey>> {
                ::silo::bean_element::primary_key(self, table, context)
            }

            fn from_cached(bean: &::silo::CachedBean) -> Option<Self> {
                ::silo::bean_element::from_cached(bean)
            }

            fn to_cached(&self) -> Option<::silo::CachedBean> {
                ::silo::bean_element::to_cached(self)
            }

            fn process(&mut self, stage: ::silo::Stage, pipeline: &mut ::silo::Pipeline) {
                ::silo::bean_element::process(self, stage, pipeline)
            }
        }
    }
}
