/// Offset between the Kelvin and Celsius scales
pub const KELVIN_OFFSET: f64 = 273.15;

/// Convert a Kelvin temperature (as the API reports it) to Fahrenheit
pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freezing_point() {
        assert!((kelvin_to_fahrenheit(273.15) - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_boiling_point() {
        assert!((kelvin_to_fahrenheit(373.15) - 212.0).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_zero() {
        assert!((kelvin_to_fahrenheit(0.0) - (-459.67)).abs() < 1e-9);
    }

    #[test]
    fn test_scales_cross_at_minus_forty() {
        assert!((kelvin_to_fahrenheit(233.15) - (-40.0)).abs() < 1e-9);
    }
}
