use crate::Coordinate;
use crate::Point;

/// an axis-aligned inclusive rectangle in the unbounded grid frame
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub x_min: Coordinate,
    pub y_min: Coordinate,
    pub x_max: Coordinate,
    pub y_max: Coordinate,
}

impl Bounds {
    pub const fn new(x_min: Coordinate, y_min: Coordinate, x_max: Coordinate, y_max: Coordinate) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }
    /// the degenerate rectangle covering a single cell
    pub const fn cell(at: Point) -> Self {
        Self::new(at.0, at.1, at.0, at.1)
    }
    pub const fn width(&self) -> usize {
        (self.x_max - self.x_min + 1) as usize
    }
    pub const fn height(&self) -> usize {
        (self.y_max - self.y_min + 1) as usize
    }
    pub const fn area(&self) -> usize {
        self.width() * self.height()
    }
    pub const fn contains(&self, at: Point) -> bool {
        self.x_min <= at.0 && at.0 <= self.x_max && self.y_min <= at.1 && at.1 <= self.y_max
    }
    pub const fn intersects(&self, other: &Self) -> bool {
        !(self.x_max < other.x_min
            || self.x_min > other.x_max
            || self.y_max < other.y_min
            || self.y_min > other.y_max)
    }
    /// the smallest rectangle covering both operands
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.x_min.min(other.x_min),
            self.y_min.min(other.y_min),
            self.x_max.max(other.x_max),
            self.y_max.max(other.y_max),
        )
    }
    pub fn center(&self) -> Point {
        (
            self.x_min + (self.x_max - self.x_min) / 2,
            self.y_min + (self.y_max - self.y_min) / 2,
        )
    }
    /// row-major iteration over every covered cell
    pub fn cells(&self) -> impl Iterator<Item = Point> + '_ {
        let this = *self;
        (this.y_min..=this.y_max)
            .flat_map(move |y| (this.x_min..=this.x_max).map(move |x| (x, y)))
    }
    /// grow symmetrically on all four sides
    pub fn inflate(&self, by: Coordinate) -> Self {
        Self::new(self.x_min - by, self.y_min - by, self.x_max + by, self.y_max + by)
    }
}

impl From<Point> for Bounds {
    fn from(at: Point) -> Self {
        Self::cell(at)
    }
}

/// the minimal rectangle covering a set of cells
impl FromIterator<Point> for Bounds {
    fn from_iter<I: IntoIterator<Item = Point>>(cells: I) -> Self {
        cells
            .into_iter()
            .map(Bounds::cell)
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Bounds::new(0, 0, 0, 0))
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{},{}]..[{},{}]", self.x_min, self.y_min, self.x_max, self.y_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry() {
        let b = Bounds::new(-2, -3, 4, 5);
        assert!(b.width() == 7);
        assert!(b.height() == 9);
        assert!(b.area() == 63);
        assert!(b.contains((0, 0)));
        assert!(b.contains((-2, 5)));
        assert!(!b.contains((5, 0)));
    }

    #[test]
    fn union_covers_both() {
        let a = Bounds::new(0, 0, 1, 1);
        let b = Bounds::new(10, -5, 12, 0);
        let u = a.union(&b);
        assert!(u == Bounds::new(0, -5, 12, 1));
        assert!(u.intersects(&a) && u.intersects(&b));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn cells_iterate_row_major() {
        let b = Bounds::new(0, 0, 1, 1);
        let cells = b.cells().collect::<Vec<_>>();
        assert!(cells == vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn bounds_from_cells() {
        let b = [(3, 1), (-1, 4), (0, 0)].into_iter().collect::<Bounds>();
        assert!(b == Bounds::new(-1, 0, 3, 4));
    }
}
