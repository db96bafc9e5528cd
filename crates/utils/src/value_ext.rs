use crate::f;

/// Extends primitives with more specific formatting options
pub trait ValueExt {
    /// Scientific number formatting with a signed, padded exponent
    ///
    /// The default `{:e}` output drops the exponent sign and padding, which
    /// makes columns of results ragged. This keeps them aligned.
    ///
    /// ```rust
    /// # use rrtools_utils::ValueExt;
    /// assert_eq!((-1.0_f64).sci(5, 2), "-1.00000e+00".to_string());
    /// assert_eq!(1.25e-3_f64.sci(3, 2), "1.250e-03".to_string());
    /// assert_eq!(1024_u64.sci(2, 3), "1.02e+003".to_string());
    /// ```
    fn sci(&self, precision: usize, exp_pad: usize) -> String;

    /// Fraction formatted as a percentage with fixed precision
    ///
    /// ```rust
    /// # use rrtools_utils::ValueExt;
    /// assert_eq!(0.125_f64.percent(2), "12.50 %".to_string());
    /// ```
    fn percent(&self, precision: usize) -> String;
}

impl ValueExt for f64 {
    fn sci(&self, precision: usize, exp_pad: usize) -> String {
        exponent_padded(f!("{:.precision$e}", self), exp_pad)
    }

    fn percent(&self, precision: usize) -> String {
        f!("{:.precision$} %", self * 100.0)
    }
}

impl ValueExt for u64 {
    fn sci(&self, precision: usize, exp_pad: usize) -> String {
        exponent_padded(f!("{:.precision$e}", self), exp_pad)
    }

    fn percent(&self, precision: usize) -> String {
        (*self as f64).percent(precision)
    }
}

/// Sign and zero-pad the exponent of a `LowerExp` formatted number
fn exponent_padded(mut number: String, exp_pad: usize) -> String {
    let Some(idx) = number.find('e') else {
        return number;
    };

    let exponent = number.split_off(idx);
    let (sign, digits) = match exponent.strip_prefix("e-") {
        Some(digits) => ('-', digits),
        None => ('+', &exponent[1..]),
    };

    number.push_str(&f!("e{sign}{digits:0>exp_pad$}"));
    number
}
