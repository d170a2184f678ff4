use serde::de::DeserializeOwned;
use serde::Serialize;

/// Declared type of a mappable field.
///
/// Recursive variants borrow `'static` data so whole field tables can live
/// in constants emitted by `#[derive(Mappable)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Option(&'static FieldType),
    List(&'static FieldType),
    /// Any other type, compared by its last path segment.
    Named(&'static str),
}

/// One field of a [`Mappable`] shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// A record shape the mapper can read from and write to.
///
/// The field table is the only metadata the mapper looks at. Serialization
/// of the value itself goes through serde.
pub trait Mappable: Serialize + DeserializeOwned {
    fn fields() -> &'static [FieldDef];

    fn field(name: &str) -> Option<&'static FieldDef> {
        Self::fields().iter().find(|f| f.name == name)
    }
}

/// `None` serializes to null and is rejected as null input.
impl<M: Mappable> Mappable for Option<M> {
    fn fields() -> &'static [FieldDef] {
        M::fields()
    }
}

impl FieldType {
    /// Whether a value declared as `self` may be stored in a field declared
    /// as `target`.
    pub fn is_assignable_to(&self, target: &FieldType) -> bool {
        use FieldType::*;

        if self == target {
            return true;
        }
        match (self, target) {
            (Option(s), Option(t)) => s.is_assignable_to(t),
            (Option(_), _) => false,
            (s, Option(t)) => s.is_assignable_to(t),
            (List(s), List(t)) => s.is_assignable_to(t),
            (s, t) => widens_to(*s, *t),
        }
    }
}

fn signed_rank(ty: FieldType) -> Option<u8> {
    match ty {
        FieldType::I8 => Some(1),
        FieldType::I16 => Some(2),
        FieldType::I32 => Some(3),
        FieldType::I64 => Some(4),
        _ => None,
    }
}

fn unsigned_rank(ty: FieldType) -> Option<u8> {
    match ty {
        FieldType::U8 => Some(1),
        FieldType::U16 => Some(2),
        FieldType::U32 => Some(3),
        FieldType::U64 => Some(4),
        _ => None,
    }
}

fn widens_to(source: FieldType, target: FieldType) -> bool {
    if target == FieldType::F64 {
        return matches!(
            source,
            FieldType::I8
                | FieldType::I16
                | FieldType::I32
                | FieldType::U8
                | FieldType::U16
                | FieldType::U32
                | FieldType::F32
        );
    }
    match (
        signed_rank(source),
        unsigned_rank(source),
        signed_rank(target),
        unsigned_rank(target),
    ) {
        (Some(s), _, Some(t), _) => s < t,
        (_, Some(s), _, Some(t)) => s < t,
        // u8 fits i16, u32 fits i64, never the same width.
        (_, Some(s), Some(t), _) => s < t,
        _ => false,
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::I8 => f.write_str("i8"),
            FieldType::I16 => f.write_str("i16"),
            FieldType::I32 => f.write_str("i32"),
            FieldType::I64 => f.write_str("i64"),
            FieldType::U8 => f.write_str("u8"),
            FieldType::U16 => f.write_str("u16"),
            FieldType::U32 => f.write_str("u32"),
            FieldType::U64 => f.write_str("u64"),
            FieldType::F32 => f.write_str("f32"),
            FieldType::F64 => f.write_str("f64"),
            FieldType::Char => f.write_str("char"),
            FieldType::String => f.write_str("String"),
            FieldType::Option(inner) => write!(f, "Option<{inner}>"),
            FieldType::List(inner) => write!(f, "Vec<{inner}>"),
            FieldType::Named(name) => f.write_str(name),
        }
    }
}

/// `std::any::type_name` with module paths stripped, generics kept:
/// `alloc::vec::Vec<app::User>` becomes `Vec<User>`.
pub fn short_type_name<T: ?Sized>() -> String {
    shorten(std::any::type_name::<T>())
}

fn shorten(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            segment.push(c);
        } else {
            out.push_str(last_segment(&segment));
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(last_segment(&segment));
    out
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::FieldType::*;
    use super::*;

    #[test]
    fn identical_types_are_assignable() {
        assert!(String.is_assignable_to(&String));
        assert!(Named("Address").is_assignable_to(&Named("Address")));
        assert!(!Named("Address").is_assignable_to(&Named("Phone")));
    }

    #[test]
    fn integer_widening_is_lossless_only() {
        assert!(I8.is_assignable_to(&I64));
        assert!(U16.is_assignable_to(&U32));
        assert!(U32.is_assignable_to(&I64));
        assert!(!U32.is_assignable_to(&I32));
        assert!(!I64.is_assignable_to(&I32));
        assert!(!I32.is_assignable_to(&U64));
    }

    #[test]
    fn floats_accept_small_integers() {
        assert!(I32.is_assignable_to(&F64));
        assert!(F32.is_assignable_to(&F64));
        assert!(!I64.is_assignable_to(&F64));
        assert!(!F64.is_assignable_to(&F32));
    }

    #[test]
    fn options_only_widen() {
        assert!(I32.is_assignable_to(&Option(&I32)));
        assert!(I32.is_assignable_to(&Option(&I64)));
        assert!(Option(&I32).is_assignable_to(&Option(&I64)));
        assert!(!Option(&I32).is_assignable_to(&I32));
    }

    #[test]
    fn lists_are_checked_element_wise() {
        assert!(List(&U8).is_assignable_to(&List(&U64)));
        assert!(!List(&String).is_assignable_to(&List(&I64)));
        assert!(!List(&I64).is_assignable_to(&I64));
    }

    #[test]
    fn type_names_lose_their_paths() {
        assert_eq!(shorten("alloc::vec::Vec<app::model::User>"), "Vec<User>");
        assert_eq!(
            shorten("core::option::Option<app::User>"),
            "Option<User>"
        );
        assert_eq!(shorten("i64"), "i64");
    }

    #[test]
    fn field_types_display_like_rust() {
        assert_eq!(Option(&List(&I32)).to_string(), "Option<Vec<i32>>");
    }
}
