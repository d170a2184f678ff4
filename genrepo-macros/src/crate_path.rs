//! Crate path resolution for generated code.
//!
//! Detects whether the user depends on `genrepo` (facade) or on the
//! individual crates, and returns the appropriate path prefix.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

fn resolve(direct: &str, facade_module: &str) -> TokenStream {
    let module = syn::Ident::new(facade_module, proc_macro2::Span::call_site());
    if let Ok(found) = crate_name("genrepo") {
        match found {
            FoundCrate::Itself => quote!(crate::#module),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident::#module)
            }
        }
    } else if let Ok(found) = crate_name(direct) {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else {
        // Fallback - assume the crate is available under its own name (for error messages)
        quote!(::#module)
    }
}

/// `::genrepo::genrepo_data` through the facade, `::genrepo_data` otherwise.
pub fn data_path() -> TokenStream {
    resolve("genrepo-data", "genrepo_data")
}

/// `::genrepo::genrepo_mapper` through the facade, `::genrepo_mapper` otherwise.
pub fn mapper_path() -> TokenStream {
    resolve("genrepo-mapper", "genrepo_mapper")
}
