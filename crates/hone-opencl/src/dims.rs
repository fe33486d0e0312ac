//! Launch geometry: 3-component extents and ND-range launch shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 3-component extent. Used both for work-group counts and work-group
/// sizes; the driver consumes the product of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim3 {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Dim3 {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// x · y · z.
    pub const fn product(&self) -> usize {
        self.x * self.y * self.z
    }

    pub const fn as_array(&self) -> [usize; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[usize; 3]> for Dim3 {
    fn from([x, y, z]: [usize; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<(usize, usize, usize)> for Dim3 {
    fn from((x, y, z): (usize, usize, usize)) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}×{}", self.x, self.y, self.z)
    }
}

/// A launch shape: how many work groups to run and how large each one is.
///
/// The global size handed to the driver is the elementwise product of the
/// two extents; launches are always submitted as 3-D with no global offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NdRange {
    pub work_groups_count: Dim3,
    pub work_group_size: Dim3,
}

impl NdRange {
    pub const fn new(work_groups_count: Dim3, work_group_size: Dim3) -> Self {
        Self {
            work_groups_count,
            work_group_size,
        }
    }

    /// Global work size per axis: `work_groups_count[i] * work_group_size[i]`.
    pub const fn global_size(&self) -> [usize; 3] {
        [
            self.work_groups_count.x * self.work_group_size.x,
            self.work_groups_count.y * self.work_group_size.y,
            self.work_groups_count.z * self.work_group_size.z,
        ]
    }

    pub const fn local_size(&self) -> [usize; 3] {
        self.work_group_size.as_array()
    }

    /// Total number of work items across the whole launch.
    pub const fn global_items(&self) -> usize {
        self.work_groups_count.product() * self.work_group_size.product()
    }
}

impl fmt::Display for NdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [gx, gy, gz] = self.global_size();
        write!(
            f,
            "{gx}×{gy}×{gz} (local {})",
            self.work_group_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_size_is_elementwise_product() {
        let range = NdRange::new(Dim3::new(2, 3, 4), Dim3::new(8, 4, 1));
        assert_eq!(range.global_size(), [16, 12, 4]);
        assert_eq!(range.local_size(), [8, 4, 1]);
        assert_eq!(range.global_items(), 16 * 12 * 4);
    }

    #[test]
    fn test_degenerate_axes() {
        let range = NdRange::new(Dim3::new(64, 1, 1), Dim3::new(32, 1, 1));
        assert_eq!(range.global_size(), [2048, 1, 1]);
    }

    #[test]
    fn test_dim3_conversions() {
        assert_eq!(Dim3::from([1, 2, 3]), Dim3::new(1, 2, 3));
        assert_eq!(Dim3::from((4, 5, 6)), Dim3::new(4, 5, 6));
        assert_eq!(Dim3::new(1, 2, 3).as_array(), [1, 2, 3]);
        assert_eq!(Dim3::new(2, 3, 4).product(), 24);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dim3::new(8, 4, 1).to_string(), "8×4×1");
        let range = NdRange::new(Dim3::new(16, 16, 1), Dim3::new(8, 8, 1));
        assert_eq!(range.to_string(), "128×128×1 (local 8×8×1)");
    }

    #[test]
    fn test_serde_round_trip() {
        let range = NdRange::new(Dim3::new(2, 3, 4), Dim3::new(8, 4, 1));
        let json = serde_json::to_string(&range).unwrap();
        let back: NdRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }
}
