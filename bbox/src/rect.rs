use crate::common::*;

/// The generic axis-aligned rectangle in image coordinates.
///
/// The x axis grows to the right and the y axis grows downwards.
pub trait Rect {
    type Type;

    fn x_min(&self) -> Self::Type;
    fn y_min(&self) -> Self::Type;
    fn x_max(&self) -> Self::Type;
    fn y_max(&self) -> Self::Type;
    fn w(&self) -> Self::Type;
    fn h(&self) -> Self::Type;

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Copy + Num + PartialOrd,
{
    fn xyxy(&self) -> [Self::Type; 4] {
        [self.x_min(), self.y_min(), self.x_max(), self.y_max()]
    }

    fn xywh(&self) -> [Self::Type; 4] {
        [self.x_min(), self.y_min(), self.w(), self.h()]
    }
}

impl<R> RectNum for R
where
    R: Rect,
    R::Type: Copy + Num + PartialOrd,
{
}

pub(crate) fn partial_min<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if rhs < lhs {
        rhs
    } else {
        lhs
    }
}

pub(crate) fn partial_max<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if rhs > lhs {
        rhs
    } else {
        lhs
    }
}
