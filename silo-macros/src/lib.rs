mod bean_trait;
mod decode_column;
mod decode_table;

use bean_trait::bean_trait;
use decode_table::decode_table;
use proc_macro::TokenStream;
use syn::{ItemStruct, parse_macro_input};

/// Implements `Bean` and `Element` for a struct with named fields.
///
/// Struct attributes: `#[silo(table = "name", processors(after_load, before_insert, ..))]`.
/// Field attributes: `name = "column"`, `pk`, `auto_increment` (or `autoincr`), `deleted`,
/// `version`, `json`, `conversion`, `extends`, `skip`, `sql_type = "VARCHAR"`,
/// `time_zone = "+02:00"`.
#[proc_macro_derive(Bean, attributes(silo))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemStruct);
    let table = decode_table(&item);
    bean_trait(&item, &table).into()
}
