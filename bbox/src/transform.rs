use crate::common::*;

/// Per-axis scaling followed by translation.
///
/// A point `(x, y)` maps to `(x * sx + tx, y * sy + ty)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sx: T,
    pub sy: T,
    pub tx: T,
    pub ty: T,
}

impl<T> Transform<T>
where
    T: Copy + Num,
{
    /// The transform that stretches a `[w, h]` canvas onto another `[w, h]` canvas.
    pub fn from_sizes_exact(src_wh: [T; 2], tgt_wh: [T; 2]) -> Self {
        let [src_w, src_h] = src_wh;
        let [tgt_w, tgt_h] = tgt_wh;
        Self {
            sx: tgt_w / src_w,
            sy: tgt_h / src_h,
            tx: T::zero(),
            ty: T::zero(),
        }
    }

    /// The transform that mirrors the y axis within a canvas of the given height.
    pub fn vertical_flip(height: T) -> Self {
        Self {
            sx: T::one(),
            sy: T::zero() - T::one(),
            tx: T::zero(),
            ty: height,
        }
    }

    /// The transform that mirrors the x axis within a canvas of the given width.
    pub fn horizontal_flip(width: T) -> Self {
        Self {
            sx: T::zero() - T::one(),
            sy: T::one(),
            tx: width,
            ty: T::zero(),
        }
    }

    pub fn apply_point(&self, point: [T; 2]) -> [T; 2] {
        let [x, y] = point;
        [x * self.sx + self.tx, y * self.sy + self.ty]
    }
}
