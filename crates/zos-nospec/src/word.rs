//! Machine-word width contract
//!
//! The bit identities behind every mask only hold inside a single
//! register-width arithmetic domain. Operands are widened to `usize` for the
//! computation and narrowed back afterwards; an operand wider than `usize`
//! would be silently truncated, so it is rejected when the generic function
//! is monomorphized instead.

/// Number of bits in a machine word.
pub const WORD_BITS: u32 = usize::BITS;

/// An integer operand accepted by the sanitizers.
///
/// Implemented for every primitive integer type. Types wider than the native
/// word (`u128`, `i128`, and `u64`/`i64` on 32-bit targets) still implement
/// the trait, but any sanitizer instantiated with them fails to build through
/// [`NospecWord::WIDTH_OK`].
pub trait NospecWord: Copy {
    /// Build-time width check. Evaluating this constant for a type wider
    /// than `usize` is a compile error.
    const WIDTH_OK: () = assert!(
        core::mem::size_of::<Self>() <= core::mem::size_of::<usize>(),
        "nospec operand is wider than a machine word"
    );

    /// Widen to a machine word. Signed values sign-extend.
    fn to_word(self) -> usize;

    /// Narrow a machine word back to this type.
    fn from_word(word: usize) -> Self;
}

macro_rules! impl_nospec_word_unsigned {
    ($($t:ty),* $(,)?) => {
        $(
            impl NospecWord for $t {
                #[inline(always)]
                fn to_word(self) -> usize {
                    self as usize
                }

                #[inline(always)]
                fn from_word(word: usize) -> Self {
                    word as $t
                }
            }
        )*
    };
}

macro_rules! impl_nospec_word_signed {
    ($($t:ty),* $(,)?) => {
        $(
            impl NospecWord for $t {
                #[inline(always)]
                fn to_word(self) -> usize {
                    self as isize as usize
                }

                #[inline(always)]
                fn from_word(word: usize) -> Self {
                    word as $t
                }
            }
        )*
    };
}

impl_nospec_word_unsigned!(u8, u16, u32, u64, u128, usize);
impl_nospec_word_signed!(i8, i16, i32, i64, i128, isize);
