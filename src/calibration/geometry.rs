use nalgebra::{Unit, UnitQuaternion, Vector3};

use crate::models::forward;

/// Squared length below which an accumulated direction counts as degenerate.
const DEGENERATE_NORM_SQUARED: f32 = 1e-9;

/// Normalised sum of `directions`, or the forward axis when the resultant
/// vanishes (empty input or cancelling directions).
pub fn average_direction<'a, I>(directions: I) -> Unit<Vector3<f32>>
where
    I: IntoIterator<Item = &'a Unit<Vector3<f32>>>,
{
    let sum = directions
        .into_iter()
        .fold(Vector3::zeros(), |acc, dir| acc + dir.into_inner());
    if sum.norm_squared() > DEGENERATE_NORM_SQUARED {
        Unit::new_normalize(sum)
    } else {
        Unit::new_unchecked(forward())
    }
}

/// Smallest rotation taking `from` onto `to`.
///
/// Anti-parallel inputs have no unique minimal rotation; a half turn about an
/// axis perpendicular to `from` is used.
pub fn from_to_rotation(from: &Unit<Vector3<f32>>, to: &Unit<Vector3<f32>>) -> UnitQuaternion<f32> {
    if let Some(rotation) = UnitQuaternion::rotation_between_axis(from, to) {
        return rotation;
    }
    let helper = if from.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let axis = Unit::new_normalize(from.cross(&helper));
    UnitQuaternion::from_axis_angle(&axis, std::f32::consts::PI)
}

/// Angle between two vectors in degrees.
///
/// Uses `atan2(|a x b|, a . b)`, which stays accurate near 0 and 180 degrees
/// where `acos` of the dot product loses precision.
pub fn angle_deg(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    let cross = a.cross(b).norm();
    let dot = a.dot(b);
    cross.atan2(dot).to_degrees()
}
