//! Type inspection shared by the derives.

use syn::{GenericArgument, PathArguments, PathSegment, Type};

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last(),
        _ => None,
    }
}

/// The single type argument of `Wrapper<T>` when the last path segment is
/// `wrapper`.
pub fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let seg = last_segment(ty)?;
    if seg.ident != wrapper {
        return None;
    }
    match &seg.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

/// Last path segment as a string, looking through references and groups.
pub fn type_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Reference(r) => type_ident(&r.elem),
        Type::Group(g) => type_ident(&g.elem),
        Type::Paren(p) => type_ident(&p.elem),
        _ => last_segment(ty).map(|seg| seg.ident.to_string()),
    }
}

/// Strip references, groups and `Box<T>`: they serialize as their target.
pub fn peel(ty: &Type) -> &Type {
    match ty {
        Type::Reference(r) => peel(&r.elem),
        Type::Group(g) => peel(&g.elem),
        Type::Paren(p) => peel(&p.elem),
        _ => match generic_inner(ty, "Box") {
            Some(inner) => peel(inner),
            None => ty,
        },
    }
}

pub fn is_integer(name: &str) -> bool {
    matches!(
        name,
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize"
    )
}

/// `OrderLine` -> `order_line`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && (prev_lower || (next_lower && chars[i - 1].is_uppercase())) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

/// Naive English plural for default table names.
pub fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{word}es");
    }
    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert_eq!(pluralize(&snake_case("OrderLine")), "order_lines");
        assert_eq!(pluralize(&snake_case("Category")), "categories");
        assert_eq!(pluralize(&snake_case("Address")), "addresses");
        assert_eq!(pluralize(&snake_case("HTTPLog")), "http_logs");
        assert_eq!(pluralize(&snake_case("Key")), "keys");
    }

    #[test]
    fn option_inner_type() {
        let ty: Type = syn::parse_quote!(Option<Vec<u8>>);
        let inner = generic_inner(&ty, "Option").unwrap();
        assert_eq!(type_ident(inner).as_deref(), Some("Vec"));
        assert!(generic_inner(&ty, "Vec").is_none());
    }
}
