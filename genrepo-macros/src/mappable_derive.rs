use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

use crate::crate_path::mapper_path;
use crate::types::{generic_inner, peel, type_ident};

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn skipped(attrs: &[syn::Attribute]) -> syn::Result<bool> {
    let mut skip = false;
    for attr in attrs {
        if attr.path().is_ident("mappable") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `skip` in #[mappable(...)]"))
                }
            })?;
        }
    }
    Ok(skip)
}

/// A constant `FieldType` expression for `ty`.
fn field_type(ty: &syn::Type, mapper: &TokenStream2) -> TokenStream2 {
    let ty = peel(ty);
    if let Some(inner) = generic_inner(ty, "Option") {
        let inner = field_type(inner, mapper);
        return quote!(#mapper::FieldType::Option(&#inner));
    }
    if let Some(inner) = generic_inner(ty, "Vec") {
        let inner = field_type(inner, mapper);
        return quote!(#mapper::FieldType::List(&#inner));
    }
    if let syn::Type::Slice(slice) = ty {
        let inner = field_type(&slice.elem, mapper);
        return quote!(#mapper::FieldType::List(&#inner));
    }
    let name = type_ident(ty).unwrap_or_else(|| "?".to_string());
    let variant = match name.as_str() {
        "bool" => "Bool",
        "i8" => "I8",
        "i16" => "I16",
        "i32" => "I32",
        "i64" | "isize" => "I64",
        "u8" => "U8",
        "u16" => "U16",
        "u32" => "U32",
        "u64" | "usize" => "U64",
        "f32" => "F32",
        "f64" => "F64",
        "char" => "Char",
        "String" | "str" => "String",
        _ => return quote!(#mapper::FieldType::Named(#name)),
    };
    let variant = syn::Ident::new(variant, proc_macro2::Span::call_site());
    quote!(#mapper::FieldType::#variant)
}

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let mapper = mapper_path();

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "#[derive(Mappable)] only works on structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "#[derive(Mappable)] only works on structs",
            ))
        }
    };

    let mut defs = Vec::new();
    for field in fields {
        let Some(ident) = &field.ident else { continue };
        if skipped(&field.attrs)? {
            continue;
        }
        let field_name = ident.to_string().trim_start_matches("r#").to_string();
        let ty = field_type(&field.ty, &mapper);
        defs.push(quote!(#mapper::FieldDef::new(#field_name, #ty)));
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #mapper::Mappable for #name #ty_generics #where_clause {
            fn fields() -> &'static [#mapper::FieldDef] {
                const FIELDS: &[#mapper::FieldDef] = &[#(#defs),*];
                FIELDS
            }
        }
    })
}
