use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::crate_path::data_path;
use crate::types::{generic_inner, is_integer, peel, pluralize, snake_case, type_ident};

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed `#[entity(...)]` options of one field.
#[derive(Default)]
struct FieldOptions {
    key: bool,
    relation: bool,
    kind: Option<syn::LitStr>,
}

fn table_name(input: &DeriveInput) -> syn::Result<String> {
    let mut table = None;
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    table = Some(lit.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `table` in #[entity(table = \"...\")]"))
                }
            })?;
        }
    }
    Ok(table.unwrap_or_else(|| pluralize(&snake_case(&input.ident.to_string()))))
}

fn field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    options.key = true;
                    Ok(())
                } else if meta.path.is_ident("relation") {
                    options.relation = true;
                    Ok(())
                } else if meta.path.is_ident("kind") {
                    options.kind = Some(meta.value()?.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("expected `key`, `relation`, or `kind = \"...\"` in #[entity(...)]"))
                }
            })?;
        }
    }
    Ok(options)
}

fn explicit_kind(lit: &syn::LitStr) -> syn::Result<&'static str> {
    match lit.value().to_ascii_lowercase().as_str() {
        "integer" => Ok("Integer"),
        "real" => Ok("Real"),
        "text" => Ok("Text"),
        "boolean" | "bool" => Ok("Boolean"),
        "blob" => Ok("Blob"),
        "json" => Ok("Json"),
        _ => Err(syn::Error::new_spanned(
            lit,
            "unknown column kind, expected one of: integer, real, text, boolean, blob, json",
        )),
    }
}

/// Storage class inferred from the field type. Unknown types are stored as
/// JSON.
fn inferred_kind(ty: &syn::Type) -> &'static str {
    let ty = peel(ty);
    if let Some(inner) = generic_inner(ty, "Option") {
        return inferred_kind(inner);
    }
    if let Some(inner) = generic_inner(ty, "Vec") {
        return if type_ident(inner).as_deref() == Some("u8") {
            "Blob"
        } else {
            "Json"
        };
    }
    match type_ident(ty).as_deref() {
        Some(name) if is_integer(name) => "Integer",
        Some("f32" | "f64") => "Real",
        Some("String" | "str" | "char") => "Text",
        Some("bool") => "Boolean",
        _ => "Json",
    }
}

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let data = data_path();
    let table = table_name(input)?;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "#[derive(Entity)] only works on structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "#[derive(Entity)] only works on structs",
            ))
        }
    };

    let mut columns = Vec::new();
    let mut keys = Vec::new();
    let mut has_id = false;
    for field in fields {
        let Some(ident) = &field.ident else { continue };
        let options = field_options(&field.attrs)?;
        if options.relation {
            if options.key || options.kind.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "a #[entity(relation)] field is not a column and cannot be a key or have a kind",
                ));
            }
            continue;
        }
        let column = ident.to_string().trim_start_matches("r#").to_string();
        let kind = match &options.kind {
            Some(lit) => explicit_kind(lit)?,
            None => inferred_kind(&field.ty),
        };
        let kind = syn::Ident::new(kind, proc_macro2::Span::call_site());
        columns.push(quote! {
            #data::Column::new(#column, #data::ColumnKind::#kind)
        });
        has_id |= column == "id";
        if options.key {
            keys.push(column);
        }
    }
    // Without explicit keys, a column named `id` is the key.
    if keys.is_empty() && has_id {
        keys.push("id".to_string());
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #data::Entity for #name #ty_generics #where_clause {
            fn table_name() -> &'static str {
                #table
            }

            fn columns() -> &'static [#data::Column] {
                const COLUMNS: &[#data::Column] = &[#(#columns),*];
                COLUMNS
            }

            fn primary_key() -> &'static [&'static str] {
                &[#(#keys),*]
            }
        }
    })
}
