//! Matrix element types: a runtime descriptor for the transport layer and a
//! typed trait for callers.
//!
//! The transport moves raw bytes and dispatches accumulation on the runtime
//! [`ElementType`] tag, so windows are agnostic to whether they hold real or
//! complex data. Callers work through [`Element`], which pins the Rust type
//! to its descriptor at compile time.

use bytemuck::Pod;
use num_complex::{Complex32, Complex64};
use num_traits::Zero;
use static_assertions::const_assert_eq;
use std::ops::AddAssign;

use crate::error::GlobalMatrixError;

/// Transport-level element descriptor: a type tag with a fixed byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ElementType {
    I32,
    I64,
    F32,
    F64,
    /// Single-precision complex (two `f32` components).
    C32,
    /// Double-precision complex (two `f64` components).
    C64,
}

impl ElementType {
    /// Byte width of one element.
    pub const fn width(self) -> usize {
        match self {
            ElementType::I32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::F64 | ElementType::C32 => 8,
            ElementType::C64 => 16,
        }
    }
}

/// A fixed-size numeric matrix element.
///
/// Implementations tie a Rust type to its [`ElementType`] descriptor; the
/// width of the descriptor is asserted against `size_of` at compile time.
/// `conj` is the identity for real types, so Hermitian symmetrization
/// reduces to ordinary symmetrization.
pub trait Element:
    Pod + AddAssign + Zero + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    /// Transport descriptor matching this type.
    const TYPE: ElementType;

    /// Complex conjugate (identity for real and integer types).
    fn conj(self) -> Self;

    /// Half of this value. Integer types round toward zero.
    fn half(self) -> Self;

    /// `(self + conj(transposed)) / 2`, the per-cell symmetrization rule.
    #[inline]
    fn hermitian_mean(self, transposed: Self) -> Self {
        let mut sum = self;
        sum += transposed.conj();
        sum.half()
    }
}

macro_rules! impl_real_element {
    ($ty:ty, $tag:ident, $half:expr) => {
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$tag;

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn half(self) -> Self {
                $half(self)
            }
        }
        const_assert_eq!(std::mem::size_of::<$ty>(), ElementType::$tag.width());
    };
}

impl_real_element!(i32, I32, |v: i32| v / 2);
impl_real_element!(i64, I64, |v: i64| v / 2);
impl_real_element!(f32, F32, |v: f32| v * 0.5);
impl_real_element!(f64, F64, |v: f64| v * 0.5);

impl Element for Complex32 {
    const TYPE: ElementType = ElementType::C32;

    #[inline]
    fn conj(self) -> Self {
        num_complex::Complex::conj(&self)
    }

    #[inline]
    fn half(self) -> Self {
        self * 0.5f32
    }
}
const_assert_eq!(std::mem::size_of::<Complex32>(), ElementType::C32.width());

impl Element for Complex64 {
    const TYPE: ElementType = ElementType::C64;

    #[inline]
    fn conj(self) -> Self {
        num_complex::Complex::conj(&self)
    }

    #[inline]
    fn half(self) -> Self {
        self * 0.5f64
    }
}
const_assert_eq!(std::mem::size_of::<Complex64>(), ElementType::C64.width());

/// Element-wise `dst += src` on raw window bytes, dispatching on `tag`.
///
/// This is the transport half of accumulation: the caller holds the target
/// window's write lock, so the whole run is applied atomically with respect
/// to other accumulates and reads.
pub(crate) fn accumulate_bytes(
    tag: ElementType,
    dst: &mut [u8],
    src: &[u8],
) -> Result<(), GlobalMatrixError> {
    if dst.len() != src.len() || dst.len() % tag.width() != 0 {
        return Err(GlobalMatrixError::Transport(format!(
            "accumulate of {} bytes into {} bytes with {:?} elements",
            src.len(),
            dst.len(),
            tag,
        )));
    }
    match tag {
        ElementType::I32 => add_assign_slice::<i32>(dst, src),
        ElementType::I64 => add_assign_slice::<i64>(dst, src),
        ElementType::F32 => add_assign_slice::<f32>(dst, src),
        ElementType::F64 => add_assign_slice::<f64>(dst, src),
        ElementType::C32 => add_assign_slice::<Complex32>(dst, src),
        ElementType::C64 => add_assign_slice::<Complex64>(dst, src),
    }
    Ok(())
}

fn add_assign_slice<T: Element>(dst: &mut [u8], src: &[u8]) {
    let dst: &mut [T] = bytemuck::cast_slice_mut(dst);
    let src: &[T] = bytemuck::cast_slice(src);
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_rust_sizes() {
        assert_eq!(ElementType::I32.width(), 4);
        assert_eq!(ElementType::C32.width(), 8);
        assert_eq!(ElementType::C64.width(), 16);
    }

    #[test]
    fn hermitian_mean_real() {
        assert_eq!(3.0f64.hermitian_mean(5.0), 4.0);
        assert_eq!(7i32.hermitian_mean(4), 5);
    }

    #[test]
    fn hermitian_mean_complex_conjugates() {
        let a = Complex64::new(1.0, -1.0);
        let b = Complex64::new(2.0, -2.0);
        // new[i][j] = (a + conj(b)) / 2
        assert_eq!(a.hermitian_mean(b), Complex64::new(1.5, 0.5));
        // and the transposed cell is the conjugate of that
        assert_eq!(
            b.hermitian_mean(a),
            Element::conj(Complex64::new(1.5, 0.5))
        );
    }

    #[test]
    fn diagonal_becomes_real() {
        let d = Complex64::new(3.0, -3.0);
        assert_eq!(d.hermitian_mean(d), Complex64::new(3.0, 0.0));
    }

    #[test]
    fn accumulate_bytes_f64() {
        let mut dst = bytemuck::cast_slice::<f64, u8>(&[1.0, 2.0]).to_vec();
        let src = [3.0f64, 4.0];
        accumulate_bytes(ElementType::F64, &mut dst, bytemuck::cast_slice(&src)).unwrap();
        assert_eq!(bytemuck::cast_slice::<u8, f64>(&dst), &[4.0, 6.0]);
    }

    #[test]
    fn accumulate_bytes_complex() {
        let mut dst = bytemuck::cast_slice::<Complex64, u8>(&[Complex64::new(1.0, 1.0)]).to_vec();
        let src = [Complex64::new(0.5, -2.0)];
        accumulate_bytes(ElementType::C64, &mut dst, bytemuck::cast_slice(&src)).unwrap();
        assert_eq!(
            bytemuck::cast_slice::<u8, Complex64>(&dst),
            &[Complex64::new(1.5, -1.0)]
        );
    }

    #[test]
    fn accumulate_bytes_rejects_mismatched_lengths() {
        let mut dst = vec![0u8; 8];
        let src = vec![0u8; 16];
        assert!(matches!(
            accumulate_bytes(ElementType::F64, &mut dst, &src),
            Err(GlobalMatrixError::Transport(_))
        ));
    }
}
