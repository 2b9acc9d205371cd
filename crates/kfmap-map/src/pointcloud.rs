/// A collection of 3d points with one rgb color per point.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    points: Vec<[f32; 3]>,
    colors: Vec<[u8; 3]>,
}

impl PointCloud {
    /// Create an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// The points as xyz coordinates.
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    /// The per point rgb colors.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Number of points in the cloud.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a single colored point.
    pub fn push(&mut self, point: [f32; 3], color: [u8; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    /// Append all points of another cloud.
    pub fn append(&mut self, mut other: PointCloud) {
        self.points.append(&mut other.points);
        self.colors.append(&mut other.colors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_append() {
        let mut a = PointCloud::new();
        assert!(a.is_empty());
        a.push([1.0, 2.0, 3.0], [255, 0, 0]);

        let mut b = PointCloud::new();
        b.push([0.0, 0.0, 1.0], [0, 255, 0]);
        b.push([0.0, 1.0, 0.0], [0, 0, 255]);

        a.append(b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.points()[1], [0.0, 0.0, 1.0]);
        assert_eq!(a.colors()[2], [0, 0, 255]);
    }
}
