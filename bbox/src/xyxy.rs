use super::{
    rect::{partial_max, partial_min},
    Rect,
};
use crate::common::*;

/// Bounding box in XYXY format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XYXY<T> {
    pub(crate) x_min: T,
    pub(crate) y_min: T,
    pub(crate) x_max: T,
    pub(crate) y_max: T,
}

impl<T> XYXY<T>
where
    T: Copy + PartialOrd,
{
    /// Compute the axis-aligned envelope of a sequence of `[x, y]` points.
    ///
    /// It fails if the sequence is empty or contains an unordered value such as NaN.
    pub fn envelope<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = [T; 2]>,
    {
        let mut points = points.into_iter();
        let [x0, y0] = points
            .next()
            .ok_or_else(|| format_err!("cannot compute the envelope of an empty point set"))?;
        ensure!(
            x0.partial_cmp(&x0).is_some() && y0.partial_cmp(&y0).is_some(),
            "point coordinates must be ordered values"
        );

        points.try_fold(
            Self {
                x_min: x0,
                y_min: y0,
                x_max: x0,
                y_max: y0,
            },
            |envelope, [x, y]| {
                ensure!(
                    x.partial_cmp(&x).is_some() && y.partial_cmp(&y).is_some(),
                    "point coordinates must be ordered values"
                );
                Ok(Self {
                    x_min: partial_min(envelope.x_min, x),
                    y_min: partial_min(envelope.y_min, y),
                    x_max: partial_max(envelope.x_max, x),
                    y_max: partial_max(envelope.y_max, y),
                })
            },
        )
    }
}

impl<T> Rect for XYXY<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn x_min(&self) -> Self::Type {
        self.x_min
    }

    fn y_min(&self) -> Self::Type {
        self.y_min
    }

    fn x_max(&self) -> Self::Type {
        self.x_max
    }

    fn y_max(&self) -> Self::Type {
        self.y_max
    }

    fn w(&self) -> Self::Type {
        self.x_max - self.x_min
    }

    fn h(&self) -> Self::Type {
        self.y_max - self.y_min
    }

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self> {
        let [x_min, y_min, x_max, y_max] = xyxy;
        ensure!(
            x_max >= x_min && y_max >= y_min,
            "x_max >= x_min and y_max >= y_min must hold"
        );

        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }
}

impl<T> From<XYXY<T>> for [T; 4] {
    fn from(from: XYXY<T>) -> Self {
        let XYXY {
            x_min,
            y_min,
            x_max,
            y_max,
        } = from;
        [x_min, y_min, x_max, y_max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectNum;

    #[test]
    fn envelope_test() {
        let envelope =
            XYXY::envelope([[10.0, 70.0], [20.0, 60.0], [15.0, 80.0], [12.0, 65.0]]).unwrap();
        assert_eq!(envelope.xyxy(), [10.0, 60.0, 20.0, 80.0]);
        assert_eq!(envelope.w(), 10.0);
        assert_eq!(envelope.h(), 20.0);
        assert_eq!(envelope.xywh(), [10.0, 60.0, 10.0, 20.0]);
    }

    #[test]
    fn envelope_of_single_point_is_degenerate() {
        let envelope = XYXY::envelope([[3.0, 4.0]]).unwrap();
        assert_eq!(envelope.xyxy(), [3.0, 4.0, 3.0, 4.0]);
        assert_eq!(envelope.w(), 0.0);
    }

    #[test]
    fn envelope_rejects_empty_and_nan() {
        assert!(XYXY::<f64>::envelope([]).is_err());
        assert!(XYXY::envelope([[0.0, 0.0], [f64::NAN, 1.0]]).is_err());
    }

    #[test]
    fn try_from_xyxy_checks_order() {
        assert!(XYXY::try_from_xyxy([0.0, 0.0, 1.0, 1.0]).is_ok());
        assert!(XYXY::try_from_xyxy([2.0, 0.0, 1.0, 1.0]).is_err());
        assert!(XYXY::try_from_xyxy([0.0, 2.0, 1.0, 1.0]).is_err());
    }
}
