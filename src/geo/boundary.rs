//! Country boundary containment for Bosnia and Herzegovina.
//!
//! The bounding box is a cheap pre-filter. Points inside it still go through
//! a ray-casting test against the border polygon, since the box alone
//! accepts the Croatian coast and the Serbian bank of the Drina.

/// Axis-aligned box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

/// Slightly larger than the country's extent (42.56–45.28 N, 15.72–19.62 E).
pub const BIH_BOUNDING_BOX: BoundingBox = BoundingBox {
    min_lat: 42.50,
    max_lat: 45.35,
    min_lng: 15.65,
    max_lng: 19.70,
};

/// Border vertices as `(lat, lng)`, clockwise from the north-west corner.
pub const BIH_BORDER: [(f64, f64); 46] = [
    (45.23, 15.79), // Velika Kladuša
    (45.17, 15.98),
    (45.22, 16.12),
    (45.15, 16.30),
    (45.24, 16.52), // Kostajnica
    (45.20, 16.75),
    (45.27, 16.92), // Una meets the Sava
    (45.21, 17.10),
    (45.14, 17.26), // Gradiška
    (45.12, 17.50),
    (45.16, 17.68),
    (45.13, 17.90),
    (45.16, 18.05), // Brod
    (45.09, 18.25),
    (45.07, 18.47), // Šamac
    (45.05, 18.68), // Orašje
    (44.95, 18.78),
    (44.87, 18.85), // Brčko
    (44.90, 19.05),
    (44.86, 19.37), // Drina meets the Sava
    (44.70, 19.30),
    (44.55, 19.16),
    (44.40, 19.12), // Zvornik
    (44.20, 19.33), // Bratunac
    (44.00, 19.46), // Skelani
    (43.85, 19.55), // Višegrad
    (43.70, 19.52),
    (43.55, 19.32), // Rudo
    (43.45, 19.08),
    (43.30, 18.90), // Šćepan Polje
    (43.10, 18.70),
    (42.85, 18.55), // Bileća
    (42.58, 18.48),
    (42.62, 18.25),
    (42.75, 18.05),
    (42.93, 17.62), // Neum
    (43.05, 17.45),
    (43.20, 17.30),
    (43.45, 17.12),
    (43.62, 16.85),
    (43.85, 16.55), // Livno
    (44.05, 16.30),
    (44.25, 16.22), // Grahovo
    (44.50, 16.05), // Kulen Vakuf
    (44.75, 15.78), // Bihać
    (45.00, 15.72),
];

/// Result of the two-stage boundary test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    OutsideBox,
    OutsidePolygon,
}

impl Containment {
    pub fn is_inside(self) -> bool {
        matches!(self, Containment::Inside)
    }
}

/// Boundary used by the validator; the default is Bosnia and Herzegovina.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryBoundary {
    pub bbox: BoundingBox,
    pub polygon: Vec<(f64, f64)>,
}

impl Default for CountryBoundary {
    fn default() -> Self {
        Self {
            bbox: BIH_BOUNDING_BOX,
            polygon: BIH_BORDER.to_vec(),
        }
    }
}

impl CountryBoundary {
    pub fn classify(&self, lat: f64, lng: f64) -> Containment {
        if !lat.is_finite() || !lng.is_finite() || !self.bbox.contains(lat, lng) {
            return Containment::OutsideBox;
        }
        if point_in_polygon(lat, lng, &self.polygon) {
            Containment::Inside
        } else {
            Containment::OutsidePolygon
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.classify(lat, lng).is_inside()
    }
}

/// Even-odd ray casting with the ray pointing east (increasing longitude).
pub fn point_in_polygon(lat: f64, lng: f64, polygon: &[(f64, f64)]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (lat_i, lng_i) = polygon[i];
        let (lat_j, lng_j) = polygon[j];
        if (lat_i > lat) != (lat_j > lat) {
            let crossing = (lng_j - lng_i) * (lat - lat_i) / (lat_j - lat_i) + lng_i;
            if lng < crossing {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cities_inside_the_country() {
        let boundary = CountryBoundary::default();
        for (name, lat, lng) in [
            ("Sarajevo", 43.8563, 18.4131),
            ("Mostar", 43.3438, 17.8078),
            ("Banja Luka", 44.7722, 17.1910),
            ("Tuzla", 44.5384, 18.6671),
        ] {
            assert_eq!(
                boundary.classify(lat, lng),
                Containment::Inside,
                "{name} should be inside"
            );
        }
    }

    #[test]
    fn belgrade_is_rejected_by_the_box() {
        let boundary = CountryBoundary::default();
        assert_eq!(boundary.classify(44.82, 20.45), Containment::OutsideBox);
    }

    #[test]
    fn split_is_inside_the_box_but_outside_the_border() {
        let boundary = CountryBoundary::default();
        assert!(BIH_BOUNDING_BOX.contains(43.5081, 16.4402));
        assert_eq!(
            boundary.classify(43.5081, 16.4402),
            Containment::OutsidePolygon
        );
    }

    #[test]
    fn non_finite_coordinates_are_outside() {
        let boundary = CountryBoundary::default();
        assert!(!boundary.contains(f64::NAN, 18.0));
        assert!(!boundary.contains(44.0, f64::INFINITY));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        assert!(!point_in_polygon(1.0, 1.0, &[(0.0, 0.0), (2.0, 2.0)]));
    }

    #[test]
    fn unit_square() {
        let square = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];
        assert!(point_in_polygon(0.5, 0.5, &square));
        assert!(!point_in_polygon(1.5, 0.5, &square));
        assert!(!point_in_polygon(0.5, -0.1, &square));
    }
}
