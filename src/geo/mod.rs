use serde::{Deserialize, Serialize};

pub mod geocoder;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// 经纬度坐标，两个分量要么同时存在要么同时缺失（不允许半个地理编码结果）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Haversine 球面距离，单位千米
///
/// 非法输入（NaN/无穷）返回正无穷，这样的点永远不会落进任何半径
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return f64::INFINITY;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// 带坐标的实体，坐标缺失的实体不参与任何邻近查询
pub trait Locatable {
    fn coordinate(&self) -> Option<Coordinate>;
}

/// 半径过滤：返回 center 周围 radius_km 内的实体及其距离，保持输入顺序
pub fn find_within<T: Locatable>(
    center: Coordinate,
    radius_km: f64,
    candidates: &[T],
) -> Vec<(&T, f64)> {
    candidates
        .iter()
        .filter_map(|entity| {
            let coord = entity.coordinate()?;
            let distance = distance_km(center, coord);
            (distance <= radius_km).then_some((entity, distance))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point {
        coord: Option<Coordinate>,
    }

    impl Locatable for Point {
        fn coordinate(&self) -> Option<Coordinate> {
            self.coord
        }
    }

    fn point(latitude: f64, longitude: f64) -> Point {
        Point {
            coord: Some(Coordinate::new(latitude, longitude)),
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let delhi = Coordinate::new(28.6139, 77.2090);
        let mumbai = Coordinate::new(19.0760, 72.8777);
        let there = distance_km(delhi, mumbai);
        let back = distance_km(mumbai, delhi);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = Coordinate::new(12.9716, 77.5946);
        assert!(distance_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn known_pair_is_plausible() {
        // 德里-孟买大圆距离约 1150km
        let delhi = Coordinate::new(28.6139, 77.2090);
        let mumbai = Coordinate::new(19.0760, 72.8777);
        let d = distance_km(delhi, mumbai);
        assert!(d > 1100.0 && d < 1200.0, "got {d}");
    }

    #[test]
    fn non_finite_input_yields_infinity() {
        let good = Coordinate::new(0.0, 0.0);
        let bad = Coordinate::new(f64::NAN, 0.0);
        assert!(distance_km(good, bad).is_infinite());
        assert!(distance_km(bad, good).is_infinite());
    }

    #[test]
    fn smaller_radius_result_is_subset_of_larger() {
        let center = Coordinate::new(28.6139, 77.2090);
        let candidates = vec![
            point(28.62, 77.21),
            point(28.70, 77.30),
            point(19.0760, 72.8777),
            point(28.6139, 77.2090),
        ];

        let near = find_within(center, 5.0, &candidates);
        let far = find_within(center, 50.0, &candidates);

        assert!(near.len() <= far.len());
        for (entity, _) in &near {
            assert!(
                far.iter()
                    .any(|(other, _)| std::ptr::eq(*entity as *const Point, *other as *const Point))
            );
        }
    }

    #[test]
    fn result_preserves_input_order_and_skips_missing_coordinates() {
        let center = Coordinate::new(0.0, 0.0);
        let candidates = vec![
            point(0.01, 0.0),
            Point { coord: None },
            point(0.0, 0.02),
            point(0.001, 0.001),
        ];

        let hits = find_within(center, 10.0, &candidates);
        assert_eq!(hits.len(), 3);
        // 与输入顺序一致，不按距离重排
        assert!(hits[0].1 > hits[2].1);
    }
}
