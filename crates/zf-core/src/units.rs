// zf-core/src/units.rs

use uom::si::f64::ThermodynamicTemperature as UomThermodynamicTemperature;

// Public canonical unit type (SI, f64)
pub type Temperature = UomThermodynamicTemperature;

#[inline]
pub fn celsius(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::degree_celsius;
    Temperature::new::<degree_celsius>(v)
}

#[inline]
pub fn fahrenheit(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::degree_fahrenheit;
    Temperature::new::<degree_fahrenheit>(v)
}

/// Zone arithmetic is done in plain Celsius; this is the way back out of uom.
#[inline]
pub fn to_celsius(t: Temperature) -> f64 {
    use uom::si::thermodynamic_temperature::degree_celsius;
    t.get::<degree_celsius>()
}

#[inline]
pub fn fahrenheit_to_celsius(v: f64) -> f64 {
    to_celsius(fahrenheit(v))
}
