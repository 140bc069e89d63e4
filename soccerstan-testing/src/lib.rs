//! Testing helpers.

use assert_float_eq::*;

pub fn assert_slice_f64_relative(expected: &[f64], actual: &[f64], epsilon: f64) {
    assert_eq!(
        expected.len(),
        actual.len(),
        "lengths do not match: {} ≠ {}",
        expected.len(),
        actual.len()
    );
    for (index, &expected) in expected.iter().enumerate() {
        let actual = actual[index];
        if actual != expected {
            assert_float_relative_eq!(expected, actual, epsilon);
        }
    }
}

/// Asserts that the sample mean of `draws` lies within `tolerance` of `expected`.
pub fn assert_mean_near(expected: f64, draws: &[f64], tolerance: f64) {
    assert!(!draws.is_empty(), "no draws");
    let mean = draws.iter().sum::<f64>() / draws.len() as f64;
    assert!(
        (mean - expected).abs() <= tolerance,
        "mean {mean} is not within {tolerance} of {expected}"
    );
}
