use crate::common::*;

/// The layout of the four box coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoxMode {
    /// `(x0, y0, x1, y1)` in absolute pixels.
    XyxyAbs,
    /// `(x0, y0, w, h)` in absolute pixels.
    XywhAbs,
}

impl BoxMode {
    /// Convert box coordinates from this mode to `to`.
    pub fn convert<T>(self, coords: [T; 4], to: BoxMode) -> [T; 4]
    where
        T: Copy + Num,
    {
        let [a, b, c, d] = coords;
        match (self, to) {
            (Self::XyxyAbs, Self::XyxyAbs) | (Self::XywhAbs, Self::XywhAbs) => coords,
            (Self::XyxyAbs, Self::XywhAbs) => [a, b, c - a, d - b],
            (Self::XywhAbs, Self::XyxyAbs) => [a, b, a + c, b + d],
        }
    }
}
