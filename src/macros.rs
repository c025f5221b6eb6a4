//! Accessor and state-scoping macros
//!
//! These macros eliminate repetitive match and save/restore code.
//! All macros use `paste` internally for identifier concatenation.

// =============================================================================
// Enum accessor generation
// =============================================================================

/// Generate is_xxx, as_xxx, as_xxx_mut for enums with single-field variants
///
/// Uses paste's `:camel` modifier to convert method name to variant name.
/// # Generated methods per variant:
/// - `is_xxx(&self) -> bool`
/// - `as_xxx(&self) -> Option<&Type>`
/// - `as_xxx_mut(&mut self) -> Option<&mut Type>`
///
/// # Example
/// ```ignore
/// impl NodeKind {
///     // element -> Element, comment -> Comment
///     impl_enum_accessors!(element: Element, comment: String);
/// }
/// ```
#[macro_export]
macro_rules! impl_enum_accessors {
    ($($variant:ident : $ty:ty),* $(,)?) => {
        ::paste::paste! {
            $(
                #[doc = "Check if this is a " [<$variant:camel>] " node"]
                #[inline]
                pub fn [<is_ $variant>](&self) -> bool {
                    matches!(self, Self::[<$variant:camel>](_))
                }

                #[doc = "Try to get as " $variant " reference"]
                #[inline]
                pub fn [<as_ $variant>](&self) -> Option<&$ty> {
                    match self { Self::[<$variant:camel>](v) => Some(v), _ => None }
                }

                #[doc = "Try to get as mutable " $variant " reference"]
                #[inline]
                pub fn [<as_ $variant _mut>](&mut self) -> Option<&mut $ty> {
                    match self { Self::[<$variant:camel>](v) => Some(v), _ => None }
                }
            )*
        }
    };
}

// =============================================================================
// Flagged sub-serialization
// =============================================================================

/// Generate `serialize_xxx_children_to_string` methods that raise one
/// context flag on the serializer state for the duration of a nested
/// serialization, then restore it.
///
/// # Generated method per flag
/// `pub fn serialize_xxx_children_to_string(&mut self, node: NodeId, escaper: Option<EscapeHandler>) -> SelserResult<String>`
///
/// # Example
/// ```ignore
/// impl WikitextSerializer<'_> {
///     // link -> state.in_link
///     impl_flagged_children_to_string!(link, caption);
/// }
/// ```
#[macro_export]
macro_rules! impl_flagged_children_to_string {
    ($($flag:ident),* $(,)?) => {
        ::paste::paste! {
            $(
                #[doc = "Serialize the children of `node` to a string with `in_" $flag "` raised"]
                pub fn [<serialize_ $flag _children_to_string>](
                    &mut self,
                    node: $crate::node::NodeId,
                    escaper: Option<$crate::wts::escape::EscapeHandler>,
                ) -> $crate::error::SelserResult<String> {
                    let saved = self.state.[<in_ $flag>];
                    self.state.[<in_ $flag>] = true;
                    let out = self.serialize_children_to_string(node, escaper);
                    self.state.[<in_ $flag>] = saved;
                    out
                }
            )*
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug)]
    enum Probe {
        Number(u32),
        Word(String),
    }

    impl Probe {
        impl_enum_accessors!(number: u32, word: String);
    }

    #[test]
    fn test_enum_accessors() {
        let mut p = Probe::Number(3);
        assert!(p.is_number());
        assert!(!p.is_word());
        assert_eq!(p.as_number(), Some(&3));
        if let Some(n) = p.as_number_mut() {
            *n = 4;
        }
        assert_eq!(p.as_number(), Some(&4));
        assert_eq!(p.as_word(), None);

        let w = Probe::Word("x".into());
        assert_eq!(w.as_word().map(String::as_str), Some("x"));
    }
}
